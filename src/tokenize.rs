//! Tokenization and severity extraction
//!
//! Tokens are lowercased alphanumeric runs from the canonical text. Bigrams,
//! when enabled, are appended after the unigrams so unigram statistics stay
//! comparable across configurations.

use serde::{Deserialize, Serialize};

/// Joins the two halves of a bigram; can never appear inside a token
pub const BIGRAM_JOINER: char = '\u{2502}';

/// How many leading tokens are inspected for a severity keyword
const LEVEL_SCAN_TOKENS: usize = 6;

/// Log severity extracted from a line's leading tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Level {
    /// Severity contribution to the raw score
    pub fn bonus(self) -> f64 {
        match self {
            Level::Warn => 0.5,
            Level::Error => 1.0,
            Level::Fatal => 1.5,
            Level::Debug | Level::Info | Level::Unknown => 0.0,
        }
    }

    /// Parse a severity name as emitted by structured loggers
    pub fn from_name(name: &str) -> Level {
        match name.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Level::Debug,
            "INFO" | "NOTICE" => Level::Info,
            "WARN" | "WARNING" => Level::Warn,
            "ERROR" | "ERR" => Level::Error,
            "FATAL" | "CRITICAL" => Level::Fatal,
            _ => Level::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split canonical text into lowercased tokens, appending bigrams on request
pub fn tokenize(canonical: &str, with_bigrams: bool) -> Vec<String> {
    let unigrams: Vec<String> = canonical
        .split(|c: char| !c.is_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.to_lowercase())
        .collect();
    let mut tokens = unigrams.clone();
    if with_bigrams && unigrams.len() >= 2 {
        for pair in unigrams.windows(2) {
            tokens.push(format!("{}{}{}", pair[0], BIGRAM_JOINER, pair[1]));
        }
    }
    tokens
}

/// Extract the severity from the first few tokens via substring match
pub fn extract_level(tokens: &[String]) -> Level {
    for token in tokens.iter().take(LEVEL_SCAN_TOKENS) {
        if token.contains("fatal") || token.contains("critical") {
            return Level::Fatal;
        }
        if token.contains("err") {
            return Level::Error;
        }
        if token.contains("warn") {
            return Level::Warn;
        }
        if token.contains("info") {
            return Level::Info;
        }
        if token.contains("debug") {
            return Level::Debug;
        }
    }
    Level::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        tokenize(s, false)
    }

    #[test]
    fn test_split_and_lowercase() {
        assert_eq!(toks("GET /api Done"), vec!["get", "api", "done"]);
        assert_eq!(toks("user=<num> code=<num>"), vec!["user", "num", "code", "num"]);
    }

    #[test]
    fn test_empty_pieces_dropped() {
        assert_eq!(toks("--  ==  "), Vec::<String>::new());
    }

    #[test]
    fn test_bigrams_appended_not_replacing() {
        let tokens = tokenize("alpha beta gamma", true);
        assert_eq!(
            tokens,
            vec![
                "alpha".to_string(),
                "beta".to_string(),
                "gamma".to_string(),
                format!("alpha{BIGRAM_JOINER}beta"),
                format!("beta{BIGRAM_JOINER}gamma"),
            ]
        );
    }

    #[test]
    fn test_single_token_has_no_bigrams() {
        assert_eq!(tokenize("alpha", true), vec!["alpha"]);
    }

    #[test]
    fn test_level_extraction() {
        assert_eq!(extract_level(&toks("ERROR payment declined code=402")), Level::Error);
        assert_eq!(extract_level(&toks("warning low disk")), Level::Warn);
        assert_eq!(extract_level(&toks("FATAL kernel oops")), Level::Fatal);
        assert_eq!(extract_level(&toks("critical section entered")), Level::Fatal);
        assert_eq!(extract_level(&toks("info started")), Level::Info);
        assert_eq!(extract_level(&toks("nothing to see")), Level::Unknown);
    }

    #[test]
    fn test_level_substring_match() {
        // "err" embedded in a larger token still counts
        assert_eq!(extract_level(&toks("stderr output captured")), Level::Error);
    }

    #[test]
    fn test_level_scan_window() {
        // Keyword past the sixth token is ignored
        let tokens = toks("a b c d e f error late");
        assert_eq!(extract_level(&tokens), Level::Unknown);
    }

    #[test]
    fn test_level_bonus_values() {
        assert_eq!(Level::Warn.bonus(), 0.5);
        assert_eq!(Level::Error.bonus(), 1.0);
        assert_eq!(Level::Fatal.bonus(), 1.5);
        assert_eq!(Level::Info.bonus(), 0.0);
        assert_eq!(Level::Unknown.bonus(), 0.0);
    }
}
