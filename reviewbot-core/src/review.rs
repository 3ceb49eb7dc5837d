use serde::{Deserialize, Serialize};

/// Severity of a review finding. Ordering is significant: `Error` ranks
/// above `Warning`, which ranks above `Info`, and the pipeline and notifier
/// both rely on that ordering when ranking comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Parse a severity string as reported by an external service.
    /// Unrecognized values yield `None`; callers normalize to `Info`.
    pub fn parse(value: &str) -> Option<Severity> {
        match value {
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    /// Marker prefixed to posted comment bodies.
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warning => "⚠️",
            Severity::Error => "❌",
        }
    }
}

/// A located review finding. Line numbers are 1-based and refer to the new
/// side of the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub filename: String,
    pub line: u32,
    pub body: String,
    pub severity: Severity,
    /// Name of the layer that produced this comment.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_parse_known_values() {
        assert_eq!(Severity::parse("error"), Some(Severity::Error));
        assert_eq!(Severity::parse("warning"), Some(Severity::Warning));
        assert_eq!(Severity::parse("info"), Some(Severity::Info));
    }

    #[test]
    fn test_severity_parse_unknown_value() {
        assert_eq!(Severity::parse("critical"), None);
        assert_eq!(Severity::parse(""), None);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"warning\""
        );
    }
}
