//! Structural canonicalization of raw log lines
//!
//! Volatile substrings (timestamps, addresses, identifiers, literals) are
//! replaced by typed sentinels so that lines sharing a shape collapse onto
//! one template. Patterns are applied in a fixed order: later patterns must
//! never clobber text an earlier pattern already masked, and the whole
//! transform is idempotent.

use regex::Regex;

/// A masked line together with its guardrail outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalLine {
    /// The masked, whitespace-normalized template text
    pub text: String,
    /// True when the raw line exceeded the length guardrail and was cut
    pub truncated: bool,
}

#[derive(Debug)]
enum RuleKind {
    /// Straight sentinel substitution
    Plain,
    /// Bare hex runs must contain a letter; pure digit runs are left for
    /// the number rule so epoch seconds and order ids stay `<num>`
    BareHex,
    /// A sign belongs to the number only when preceded by start-of-input
    /// or a non-alphanumeric character; the separator hyphen in compound
    /// identifiers like `order-1029` stays put
    SignedNumber,
}

#[derive(Debug)]
struct MaskRule {
    re: Regex,
    sentinel: &'static str,
    kind: RuleKind,
}

/// Applies the ordered mask rules; owns its compiled patterns
#[derive(Debug)]
pub struct Canonicalizer {
    rules: Vec<MaskRule>,
    max_line_length: usize,
}

const TIMESTAMP: &str = r"\b\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?\b|\b\d{2}/[A-Z][a-z]{2}/\d{4}:\d{2}:\d{2}:\d{2}(?: [+-]\d{4})?\b|\b[A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2}\b";
const IP: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b|\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b|(?:[0-9a-fA-F]{1,4}:){1,6}:(?:[0-9a-fA-F]{1,4}(?::[0-9a-fA-F]{1,4}){0,5})?";
const UUID: &str =
    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b";
const HEX: &str = r"\b0[xX][0-9a-fA-F]+\b|\b[0-9a-fA-F]{8,}\b";
const EMAIL: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const URL: &str = r"\b[a-zA-Z][a-zA-Z0-9+.-]*://\S+";
const PATH: &str = r#"'(?:/[\w.-]+){2,}/?'|"(?:/[\w.-]+){2,}/?"|(?:/[\w.-]+){2,}/?|'[A-Za-z]:\\[\w.\\-]+'|"[A-Za-z]:\\[\w.\\-]+"|\b[A-Za-z]:\\[\w.\\-]+"#;
const QUOTED: &str = r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#;
const NUMBER: &str = r"(^|[^0-9A-Za-z])([+-]\d+(?:\.\d+)?)\b|\b\d+(?:\.\d+)?\b";

impl Canonicalizer {
    /// Compile the mask rules once; the instance is engine-scoped
    pub fn new(max_line_length: usize) -> Self {
        let rule = |pattern: &str, sentinel: &'static str, kind: RuleKind| MaskRule {
            re: Regex::new(pattern).unwrap(),
            sentinel,
            kind,
        };
        Self {
            rules: vec![
                rule(TIMESTAMP, "<ts>", RuleKind::Plain),
                rule(IP, "<ip>", RuleKind::Plain),
                rule(UUID, "<uuid>", RuleKind::Plain),
                rule(HEX, "<hex>", RuleKind::BareHex),
                rule(EMAIL, "<email>", RuleKind::Plain),
                rule(URL, "<url>", RuleKind::Plain),
                rule(PATH, "<path>", RuleKind::Plain),
                rule(QUOTED, "<str>", RuleKind::Plain),
                rule(NUMBER, "<num>", RuleKind::SignedNumber),
            ],
            max_line_length,
        }
    }

    /// Mask a raw line into its canonical template
    pub fn mask(&self, raw: &str) -> CanonicalLine {
        let (mut text, truncated) = self.truncate(raw);
        text = text.trim().to_string();
        for rule in &self.rules {
            let replaced = match rule.kind {
                RuleKind::Plain => rule.re.replace_all(&text, rule.sentinel).into_owned(),
                RuleKind::BareHex => rule
                    .re
                    .replace_all(&text, |caps: &regex::Captures<'_>| {
                        let m = &caps[0];
                        let prefixed = m.starts_with("0x") || m.starts_with("0X");
                        if prefixed || m.bytes().any(|b| b.is_ascii_alphabetic()) {
                            rule.sentinel.to_string()
                        } else {
                            m.to_string()
                        }
                    })
                    .into_owned(),
                RuleKind::SignedNumber => rule
                    .re
                    .replace_all(&text, |caps: &regex::Captures<'_>| {
                        // Group 1 holds whatever sat before an accepted sign;
                        // put it back so only the literal itself is masked
                        match caps.get(1) {
                            Some(pre) => format!("{}{}", pre.as_str(), rule.sentinel),
                            None => rule.sentinel.to_string(),
                        }
                    })
                    .into_owned(),
            };
            text = replaced;
        }
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        CanonicalLine { text, truncated }
    }

    fn truncate(&self, raw: &str) -> (String, bool) {
        if raw.chars().count() > self.max_line_length {
            (raw.chars().take(self.max_line_length).collect(), true)
        } else {
            (raw.to_string(), false)
        }
    }
}
