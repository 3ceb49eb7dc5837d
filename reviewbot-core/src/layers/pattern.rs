use async_trait::async_trait;
use regex::Regex;

use crate::diff::{DiffLineKind, ParsedDiff};
use crate::layers::ReviewLayer;
use crate::review::{ReviewComment, Severity};

/// A single pattern rule. Every added line is tested against every rule, and
/// every match emits one comment, so a single line can trigger several rules.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: String,
    pub pattern: Regex,
    pub message: String,
    pub severity: Severity,
}

impl PatternRule {
    pub fn new(id: &str, pattern: &str, message: &str, severity: Severity) -> Self {
        PatternRule {
            id: id.to_string(),
            pattern: Regex::new(pattern).expect("rule pattern is valid"),
            message: message.to_string(),
            severity,
        }
    }
}

/// Scans added lines against an ordered list of regex rules.
pub struct PatternLayer {
    rules: Vec<PatternRule>,
}

impl PatternLayer {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        PatternLayer { rules }
    }

    /// The built-in rule set. Message and severity are part of the contract.
    pub fn default_rules() -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "no-console-log",
                r"\bconsole\.(log|debug|info)\s*\(",
                "`console.log/debug/info` detected — remove before merging.",
                Severity::Warning,
            ),
            PatternRule::new(
                "no-todo-fixme",
                r"\b(TODO|FIXME|HACK|XXX)\b",
                "Unresolved TODO/FIXME/HACK/XXX comment detected.",
                Severity::Info,
            ),
            PatternRule::new(
                "no-hardcoded-secrets",
                r#"(?i)(password|passwd|api_key|apikey|secret|token|auth)\s*[:=]\s*['"][^'"]{4,}"#,
                "Possible hardcoded secret — use environment variables instead.",
                Severity::Error,
            ),
            PatternRule::new(
                "no-debugger",
                r"\bdebugger\b",
                "`debugger` statement detected — remove before merging.",
                Severity::Error,
            ),
            PatternRule::new(
                "no-alert",
                r"\balert\s*\(",
                "`alert()` detected — remove or replace with proper UX.",
                Severity::Warning,
            ),
        ]
    }
}

impl Default for PatternLayer {
    fn default() -> Self {
        PatternLayer::new(PatternLayer::default_rules())
    }
}

#[async_trait]
impl ReviewLayer for PatternLayer {
    fn name(&self) -> &str {
        "PatternLayer"
    }

    async fn analyze(&self, diff: &ParsedDiff) -> Vec<ReviewComment> {
        let mut comments = Vec::new();

        for file in &diff.files {
            for hunk in &file.hunks {
                for line in &hunk.lines {
                    if line.kind != DiffLineKind::Added {
                        continue;
                    }

                    for rule in &self.rules {
                        if rule.pattern.is_match(&line.content) {
                            comments.push(ReviewComment {
                                filename: file.filename.clone(),
                                line: line.new_line.unwrap_or(0),
                                body: format!("[{}] {}", rule.id, rule.message),
                                severity: rule.severity,
                                source: self.name().to_string(),
                            });
                        }
                    }
                }
            }
        }

        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_diff;

    fn diff_with_added_line(content: &str) -> ParsedDiff {
        let raw = format!(
            "diff --git a/src/x.ts b/src/x.ts\n--- a/src/x.ts\n+++ b/src/x.ts\n@@ -1 +1,2 @@\n context\n+{}",
            content
        );
        parse_diff(&raw)
    }

    #[tokio::test]
    async fn test_console_log_yields_single_warning() {
        let layer = PatternLayer::default();
        let comments = layer.analyze(&diff_with_added_line(r#"console.log("x")"#)).await;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].severity, Severity::Warning);
        assert!(comments[0].body.starts_with("[no-console-log]"));
        assert_eq!(comments[0].line, 2);
    }

    #[tokio::test]
    async fn test_debugger_yields_single_error() {
        let layer = PatternLayer::default();
        let comments = layer.analyze(&diff_with_added_line("debugger;")).await;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].severity, Severity::Error);
        assert!(comments[0].body.starts_with("[no-debugger]"));
    }

    #[tokio::test]
    async fn test_hardcoded_secret_detected() {
        let layer = PatternLayer::default();
        let comments = layer
            .analyze(&diff_with_added_line(r#"const apiKey = "abcd1234";"#))
            .await;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].severity, Severity::Error);
        assert!(comments[0].body.starts_with("[no-hardcoded-secrets]"));
    }

    #[tokio::test]
    async fn test_short_quoted_value_is_not_a_secret() {
        let layer = PatternLayer::default();
        let comments = layer
            .analyze(&diff_with_added_line(r#"const token = "abc";"#))
            .await;
        assert!(comments.is_empty());
    }

    #[tokio::test]
    async fn test_one_line_can_trigger_multiple_rules() {
        let layer = PatternLayer::default();
        // TODO marker plus console call on the same added line
        let comments = layer
            .analyze(&diff_with_added_line("console.log(x); // TODO remove"))
            .await;
        assert_eq!(comments.len(), 2);
    }

    #[tokio::test]
    async fn test_removed_and_context_lines_are_ignored() {
        let raw = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1,2 +1,1 @@\n console.log(kept)\n-debugger;";
        let layer = PatternLayer::default();
        let comments = layer.analyze(&parse_diff(raw)).await;
        assert!(comments.is_empty());
    }

    #[tokio::test]
    async fn test_custom_rule_list() {
        let layer = PatternLayer::new(vec![PatternRule::new(
            "no-unwrap",
            r"\.unwrap\(\)",
            "unwrap in production code",
            Severity::Warning,
        )]);
        let comments = layer.analyze(&diff_with_added_line("let x = y.unwrap();")).await;
        assert_eq!(comments.len(), 1);
        assert!(comments[0].body.starts_with("[no-unwrap]"));
    }
}
