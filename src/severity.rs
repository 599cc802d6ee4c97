use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`LogRecord`](crate::record::LogRecord).
///
/// Mirrors the Cloud Logging `LogSeverity` set. Variants are declared in
/// ascending order so the derived `Ord` can be used for threshold checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// Map free text to a severity, case-insensitively.
    ///
    /// Unknown or empty text maps to [`Severity::Default`]. A few common
    /// aliases (`WARN`, `FATAL`, `TRACE`) are accepted as well.
    pub fn parse_lossy(text: &str) -> Severity {
        match text.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Severity::Debug,
            "INFO" => Severity::Info,
            "NOTICE" => Severity::Notice,
            "WARNING" | "WARN" => Severity::Warning,
            "ERROR" => Severity::Error,
            "CRITICAL" | "FATAL" => Severity::Critical,
            "ALERT" => Severity::Alert,
            "EMERGENCY" => Severity::Emergency,
            _ => Severity::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!(Severity::parse_lossy("error"), Severity::Error);
        assert_eq!(Severity::parse_lossy("Warning"), Severity::Warning);
        assert_eq!(Severity::parse_lossy(" notice "), Severity::Notice);
        assert_eq!(Severity::parse_lossy("warn"), Severity::Warning);
    }

    #[test]
    fn unknown_text_falls_back_to_default() {
        assert_eq!(Severity::parse_lossy(""), Severity::Default);
        assert_eq!(Severity::parse_lossy("loud"), Severity::Default);
    }

    #[test]
    fn ordering_follows_log_severity() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn serializes_as_upper_case_name() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
    }
}
