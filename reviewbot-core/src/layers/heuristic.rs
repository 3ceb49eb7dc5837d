use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use crate::diff::{DiffLineKind, FileDiff, ParsedDiff};
use crate::layers::ReviewLayer;
use crate::review::{ReviewComment, Severity};

/// Matches the start of a function definition on an added line: a plain or
/// exported/async function declaration, an arrow-function assignment, or a
/// method with an opening brace.
static FUNCTION_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:async\s+)?(?:function\b|(?:const|let|var)\s+\w+\s*=\s*(?:async\s+)?(?:\([^)]*\)|\w+)\s*=>|\w+\s*\([^)]*\)\s*\{)",
    )
    .expect("function start pattern is valid")
});

/// Thresholds for the structural checks. Each is independently overridable:
///
/// ```
/// use reviewbot_core::HeuristicThresholds;
/// let t = HeuristicThresholds { max_file_churn: 100, ..Default::default() };
/// assert_eq!(t.max_function_lines, 50);
/// ```
#[derive(Debug, Clone)]
pub struct HeuristicThresholds {
    pub max_function_lines: u32,
    pub max_file_churn: u32,
    pub max_nesting_depth: u32,
    pub max_total_additions: u32,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        HeuristicThresholds {
            max_function_lines: 50,
            max_file_churn: 300,
            max_nesting_depth: 4,
            max_total_additions: 500,
        }
    }
}

/// Structural checks that reason about the shape and size of a change rather
/// than matching individual line contents.
pub struct HeuristicLayer {
    thresholds: HeuristicThresholds,
}

impl HeuristicLayer {
    pub fn new(thresholds: HeuristicThresholds) -> Self {
        HeuristicLayer { thresholds }
    }

    /// High churn usually means a file is being rewritten rather than edited.
    fn check_file_churn(&self, file: &FileDiff, comments: &mut Vec<ReviewComment>) {
        let churn = file.additions + file.deletions;
        if churn > self.thresholds.max_file_churn {
            comments.push(ReviewComment {
                filename: file.filename.clone(),
                line: 1,
                body: format!(
                    "High file churn ({} changes) — consider splitting into smaller changes.",
                    churn
                ),
                severity: Severity::Warning,
                source: self.name().to_string(),
            });
        }
    }

    /// Brace-counting over added lines to find functions that exceed the
    /// line-count threshold.
    fn check_long_functions(&self, file: &FileDiff, comments: &mut Vec<ReviewComment>) {
        for hunk in &file.hunks {
            let mut in_function = false;
            let mut start_line = 0u32;
            let mut line_count = 0u32;
            let mut brace_depth = 0i32;

            for line in &hunk.lines {
                if line.kind != DiffLineKind::Added {
                    continue;
                }

                if !in_function && FUNCTION_START_RE.is_match(&line.content) {
                    in_function = true;
                    start_line = line.new_line.unwrap_or(0);
                    line_count = 0;
                    brace_depth = 0;
                }

                if in_function {
                    line_count += 1;
                    brace_depth += line.content.matches('{').count() as i32;
                    brace_depth -= line.content.matches('}').count() as i32;

                    if brace_depth <= 0 && line_count > 1 {
                        if line_count > self.thresholds.max_function_lines {
                            comments.push(ReviewComment {
                                filename: file.filename.clone(),
                                line: start_line,
                                body: format!(
                                    "Function is {} lines long (limit: {}) — consider extracting smaller functions.",
                                    line_count, self.thresholds.max_function_lines
                                ),
                                severity: Severity::Warning,
                                source: self.name().to_string(),
                            });
                        }
                        in_function = false;
                    }
                }
            }
        }
    }

    /// Indentation depth: each tab counts 1, every 2 leading spaces count 1.
    fn check_deep_nesting(&self, file: &FileDiff, comments: &mut Vec<ReviewComment>) {
        for hunk in &file.hunks {
            for line in &hunk.lines {
                if line.kind != DiffLineKind::Added || line.content.trim().is_empty() {
                    continue;
                }

                let leading: Vec<char> = line
                    .content
                    .chars()
                    .take_while(|c| c.is_whitespace())
                    .collect();
                let tabs = leading.iter().filter(|&&c| c == '\t').count() as u32;
                let spaces = (leading.len() as u32 - tabs) / 2;
                let depth = tabs + spaces;

                if depth > self.thresholds.max_nesting_depth {
                    comments.push(ReviewComment {
                        filename: file.filename.clone(),
                        line: line.new_line.unwrap_or(0),
                        body: format!(
                            "Deeply nested code (depth {}) — consider early returns or extracting helpers.",
                            depth
                        ),
                        severity: Severity::Info,
                        source: self.name().to_string(),
                    });
                }
            }
        }
    }

    fn check_large_commit(&self, diff: &ParsedDiff, comments: &mut Vec<ReviewComment>) {
        if diff.total_additions > self.thresholds.max_total_additions {
            let first_file = diff
                .files
                .first()
                .map(|f| f.filename.as_str())
                .unwrap_or("unknown");
            comments.push(ReviewComment {
                filename: first_file.to_string(),
                line: 1,
                body: format!(
                    "Large commit: {} additions across {} file(s) — consider breaking into smaller PRs.",
                    diff.total_additions,
                    diff.files.len()
                ),
                severity: Severity::Warning,
                source: self.name().to_string(),
            });
        }
    }
}

impl Default for HeuristicLayer {
    fn default() -> Self {
        HeuristicLayer::new(HeuristicThresholds::default())
    }
}

#[async_trait]
impl ReviewLayer for HeuristicLayer {
    fn name(&self) -> &str {
        "HeuristicLayer"
    }

    async fn analyze(&self, diff: &ParsedDiff) -> Vec<ReviewComment> {
        let mut comments = Vec::new();

        for file in &diff.files {
            self.check_file_churn(file, &mut comments);
            self.check_long_functions(file, &mut comments);
            self.check_deep_nesting(file, &mut comments);
        }

        self.check_large_commit(diff, &mut comments);

        comments
    }
}
