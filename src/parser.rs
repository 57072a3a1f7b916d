//! Lightweight line parsing for the CLI collaborators
//!
//! Structured (JSON) logs are tried first; anything else falls back to a
//! naive scan for a severity keyword and an ISO-like timestamp. Parsing
//! never fails a line: worst case the whole line becomes the message.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

const LEVELS: &[&str] = &[
    "CRITICAL", "FATAL", "ERROR", "WARN", "WARNING", "INFO", "DEBUG", "TRACE",
];

/// Parsed view of one raw line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub message: String,
}

/// Owns the compiled fallback patterns
pub struct LineParser {
    level_re: Regex,
    timestamp_re: Regex,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            level_re: Regex::new(r"\b(CRITICAL|FATAL|ERROR|WARN(?:ING)?|INFO|DEBUG|TRACE)\b")
                .unwrap(),
            timestamp_re: Regex::new(r"\d{4}-\d{2}-\d{2}[T ]?\d{2}:\d{2}:\d{2}(?:\.\d+)?")
                .unwrap(),
        }
    }

    /// Extract (timestamp, level, message) from a raw line
    pub fn parse(&self, raw: &str) -> ParsedLine {
        let line = raw.trim();
        if line.is_empty() {
            return ParsedLine {
                timestamp: None,
                level: None,
                message: String::new(),
            };
        }

        if line.starts_with('{') && line.ends_with('}') {
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(obj)) => {
                    let timestamp = ["timestamp", "ts", "@timestamp"]
                        .iter()
                        .find_map(|key| obj.get(*key))
                        .and_then(json_scalar);
                    let level = ["level", "severity", "lvl"]
                        .iter()
                        .find_map(|key| obj.get(*key))
                        .and_then(Value::as_str)
                        .map(str::to_ascii_uppercase)
                        .filter(|name| LEVELS.contains(&name.as_str()));
                    let message = ["message", "msg", "log"]
                        .iter()
                        .find_map(|key| obj.get(*key))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| line.to_string());
                    return ParsedLine {
                        timestamp,
                        level,
                        message,
                    };
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(error = %err, "JSON-looking line failed to parse; using raw text");
                }
            }
        }

        let level = self
            .level_re
            .find(line)
            .map(|m| m.as_str().to_ascii_uppercase());
        let timestamp = self.timestamp_re.find(line).map(|m| m.as_str().to_string());
        ParsedLine {
            timestamp,
            level,
            message: line.to_string(),
        }
    }
}

fn json_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_log_extraction() {
        let parser = LineParser::new();
        let parsed = parser.parse(
            r#"{"timestamp": "2025-10-01T12:00:00Z", "level": "error", "message": "payment declined"}"#,
        );
        assert_eq!(parsed.timestamp.as_deref(), Some("2025-10-01T12:00:00Z"));
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
        assert_eq!(parsed.message, "payment declined");
    }

    #[test]
    fn test_json_alternate_keys() {
        let parser = LineParser::new();
        let parsed = parser.parse(r#"{"ts": 1700000000, "lvl": "WARN", "msg": "low disk"}"#);
        assert_eq!(parsed.timestamp.as_deref(), Some("1700000000"));
        assert_eq!(parsed.level.as_deref(), Some("WARN"));
        assert_eq!(parsed.message, "low disk");
    }

    #[test]
    fn test_unknown_json_level_dropped() {
        let parser = LineParser::new();
        let parsed = parser.parse(r#"{"level": "SHOUTING", "message": "hi"}"#);
        assert_eq!(parsed.level, None);
    }

    #[test]
    fn test_plain_line_level_and_timestamp() {
        let parser = LineParser::new();
        let parsed = parser.parse("2025-10-01T12:00:00 ERROR payment declined");
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
        assert_eq!(parsed.timestamp.as_deref(), Some("2025-10-01T12:00:00"));
        assert_eq!(parsed.message, "2025-10-01T12:00:00 ERROR payment declined");
    }

    #[test]
    fn test_malformed_json_degrades_to_text() {
        let parser = LineParser::new();
        let parsed = parser.parse(r#"{"level": "ERROR", "message": oops}"#);
        assert_eq!(parsed.message, r#"{"level": "ERROR", "message": oops}"#);
        // Fallback regex still finds the level keyword
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
    }

    #[test]
    fn test_empty_line() {
        let parser = LineParser::new();
        let parsed = parser.parse("   ");
        assert_eq!(parsed.message, "");
        assert_eq!(parsed.level, None);
    }
}
