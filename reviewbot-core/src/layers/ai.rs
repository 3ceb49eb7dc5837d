use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::diff::{DiffLineKind, FileDiff, FileStatus, ParsedDiff};
use crate::layers::ReviewLayer;
use crate::review::{ReviewComment, Severity};

const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Context lines included around each added line in the summary.
const CONTEXT_WINDOW: usize = 3;
/// Upper bound on summary lines sent to the model.
const MAX_SUMMARY_LINES: usize = 400;
const TRUNCATION_NOTICE: &str = "... (diff truncated for length)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Files that are noise for an AI reviewer: tests, lockfiles, bundled or
/// generated output, build directories, type declarations, snapshots.
static EXCLUDED_FILE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\.test\.|\.spec\.|__tests__/|_test\.)",
        r"(?:^|/)(package-lock\.json|yarn\.lock|pnpm-lock\.yaml|Cargo\.lock|Gemfile\.lock|composer\.lock)$",
        r"\.(min|bundle)\.(js|css)$",
        r"(?i)(\.generated\.|\.gen\.|/generated/)",
        r"(?:^|/)(dist|build|out|node_modules|target)/",
        r"\.d\.ts$",
        r"(\.snap$|__snapshots__/)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("exclusion pattern is valid"))
    .collect()
});

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer focused on finding FUNCTIONAL problems, not style issues.

Analyze the code diff and return a JSON object with a "comments" array.

Each comment must have:
- "filename": string (file path)
- "line": number (line number)
- "body": string (concise, actionable feedback)
- "severity": "info" | "warning" | "error"

FOCUS ON:
- Bugs and logic errors (off-by-one, null pointer, race conditions)
- Security vulnerabilities (SQL injection, XSS, insecure crypto)
- Performance issues (N+1 queries, unnecessary loops, memory leaks)
- Correctness issues (wrong algorithm, broken edge cases)

IGNORE:
- console.log statements
- Hardcoded strings/secrets
- TODO/FIXME comments
- Naming conventions
- Code style
- Missing comments

Return {"comments": []} if you find no functional issues.
Respond ONLY with valid JSON, no markdown."#;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AiReviewResponse {
    comments: Option<Vec<AiRawComment>>,
}

#[derive(Debug, Deserialize)]
struct AiRawComment {
    filename: Option<String>,
    line: Option<u32>,
    body: Option<String>,
    severity: Option<String>,
}

/// Sends a bounded summary of the diff to an OpenAI-compatible
/// chat-completion service and validates the returned JSON into comments.
///
/// Best-effort by contract: any call failure, timeout, or unparsable
/// response yields an empty result. An empty summary short-circuits without
/// making a network call at all.
pub struct AiLayer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AiLayer {
    pub fn new(api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("reviewbot/0.1.0")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        AiLayer {
            client,
            api_key,
            model,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    async fn request_review(&self, summary: &str) -> Result<String> {
        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            temperature: 0.2,
            max_tokens: 2048,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Review the following code diff and provide feedback:\n\n{}",
                        summary
                    ),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            return Err(anyhow!(
                "Chat completion API error: {} - {}",
                status,
                error_text
            ));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Chat completion response contained no content"))
    }
}

#[async_trait]
impl ReviewLayer for AiLayer {
    fn name(&self) -> &str {
        "AiLayer"
    }

    async fn analyze(&self, diff: &ParsedDiff) -> Vec<ReviewComment> {
        let summary = build_summary(diff);
        if summary.trim().is_empty() {
            return Vec::new();
        }

        match self.request_review(&summary).await {
            Ok(content) => {
                let comments = parse_response(&content, diff, self.name());
                info!(count = comments.len(), "AI review returned comments");
                comments
            }
            Err(e) => {
                warn!(error = %e, "AI review call failed, contributing no comments");
                Vec::new()
            }
        }
    }
}

fn is_excluded(filename: &str) -> bool {
    EXCLUDED_FILE_RES.iter().any(|re| re.is_match(filename))
}

/// Review priority of a file, judged by its path. Higher reviews first:
/// security-sensitive code, then request-handling code, then data models,
/// then utilities and config; test-like files rank below everything.
fn priority(filename: &str) -> u8 {
    let f = filename.to_lowercase();
    if f.contains("test") || f.contains("spec") {
        0
    } else if ["security", "auth", "payment", "crypto", "password"]
        .iter()
        .any(|k| f.contains(k))
    {
        5
    } else if ["api", "service", "controller", "route", "handler"]
        .iter()
        .any(|k| f.contains(k))
    {
        4
    } else if ["model", "schema", "entity"].iter().any(|k| f.contains(k)) {
        3
    } else if ["util", "helper", "config"].iter().any(|k| f.contains(k)) {
        2
    } else {
        1
    }
}

/// Builds the bounded textual summary of the diff sent to the model: high
/// priority files first, each added line with a window of surrounding
/// context, cut off at a total line budget.
fn build_summary(diff: &ParsedDiff) -> String {
    let mut files: Vec<&FileDiff> = diff
        .files
        .iter()
        .filter(|f| f.status != FileStatus::Deleted && !is_excluded(&f.filename))
        .collect();
    // Stable sort keeps diff order within a priority band
    files.sort_by_key(|f| std::cmp::Reverse(priority(&f.filename)));

    let mut out: Vec<String> = Vec::new();
    let mut emitted = 0usize;
    let mut truncated = false;

    'files: for file in files {
        let section = file_summary_lines(file);
        if section.is_empty() {
            continue;
        }

        if !out.is_empty() {
            out.push(String::new());
        }
        out.push(format!("--- File: {} ---", file.filename));

        for line in section {
            if emitted >= MAX_SUMMARY_LINES {
                truncated = true;
                break 'files;
            }
            out.push(line);
            emitted += 1;
        }
    }

    if truncated {
        out.push(TRUNCATION_NOTICE.to_string());
    }

    out.join("\n")
}

fn file_summary_lines(file: &FileDiff) -> Vec<String> {
    let mut lines = Vec::new();

    for hunk in &file.hunks {
        let added: Vec<usize> = hunk
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.kind == DiffLineKind::Added)
            .map(|(i, _)| i)
            .collect();
        if added.is_empty() {
            continue;
        }

        let mut include = vec![false; hunk.lines.len()];
        for &i in &added {
            let lo = i.saturating_sub(CONTEXT_WINDOW);
            let hi = (i + CONTEXT_WINDOW).min(hunk.lines.len() - 1);
            for slot in &mut include[lo..=hi] {
                *slot = true;
            }
        }

        for (i, line) in hunk.lines.iter().enumerate() {
            // Removed lines have no new-side coordinate and are omitted
            if !include[i] || line.kind == DiffLineKind::Removed {
                continue;
            }
            let number = line.new_line.unwrap_or(0);
            match line.kind {
                DiffLineKind::Added => lines.push(format!("+{}: {}", number, line.content)),
                _ => lines.push(format!(" {}: {}", number, line.content)),
            }
        }
    }

    lines
}

/// Boundary-validates the model's JSON: entries naming an unknown file or
/// missing a line or body are discarded; unrecognized severities become info.
fn parse_response(content: &str, diff: &ParsedDiff, source: &str) -> Vec<ReviewComment> {
    let parsed: AiReviewResponse = match serde_json::from_str(content) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to parse AI response as JSON");
            return Vec::new();
        }
    };

    let Some(raw_comments) = parsed.comments else {
        return Vec::new();
    };

    let known_files: HashSet<&str> = diff.files.iter().map(|f| f.filename.as_str()).collect();

    raw_comments
        .into_iter()
        .filter_map(|c| {
            let filename = c.filename?;
            let line = c.line.filter(|&l| l > 0)?;
            let body = c.body.filter(|b| !b.is_empty())?;
            if !known_files.contains(filename.as_str()) {
                return None;
            }
            let severity = c
                .severity
                .as_deref()
                .and_then(Severity::parse)
                .unwrap_or(Severity::Info);
            Some(ReviewComment {
                filename,
                line,
                body,
                severity,
                source: source.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse_diff;

    fn two_file_diff() -> ParsedDiff {
        parse_diff(
            "diff --git a/src/util.ts b/src/util.ts\n\
             --- a/src/util.ts\n\
             +++ b/src/util.ts\n\
             @@ -1 +1,2 @@\n \
             existing\n\
             +added util line\n\
             diff --git a/src/auth.ts b/src/auth.ts\n\
             --- a/src/auth.ts\n\
             +++ b/src/auth.ts\n\
             @@ -1 +1,2 @@\n \
             existing\n\
             +added auth line",
        )
    }

    #[test]
    fn test_excluded_filenames() {
        assert!(is_excluded("src/app.test.ts"));
        assert!(is_excluded("src/__tests__/app.ts"));
        assert!(is_excluded("package-lock.json"));
        assert!(is_excluded("assets/vendor.min.js"));
        assert!(is_excluded("dist/app.js"));
        assert!(is_excluded("types/index.d.ts"));
        assert!(is_excluded("src/__snapshots__/x.snap"));
        assert!(!is_excluded("src/app.ts"));
        assert!(!is_excluded("src/distribution.ts"));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(priority("src/auth/login.ts") > priority("src/api/users.ts"));
        assert!(priority("src/api/users.ts") > priority("src/models/user.ts"));
        assert!(priority("src/models/user.ts") > priority("src/utils/fmt.ts"));
        assert!(priority("src/utils/fmt.ts") > priority("src/misc.ts"));
        assert!(priority("src/misc.ts") > priority("src/app.test-helpers.ts"));
    }

    #[test]
    fn test_summary_orders_high_priority_files_first() {
        let summary = build_summary(&two_file_diff());
        let auth_pos = summary.find("src/auth.ts").expect("auth file in summary");
        let util_pos = summary.find("src/util.ts").expect("util file in summary");
        assert!(auth_pos < util_pos);
    }

    #[test]
    fn test_summary_includes_context_and_added_lines() {
        let summary = build_summary(&two_file_diff());
        assert!(summary.contains("+2: added util line"));
        assert!(summary.contains(" 1: existing"));
    }

    #[test]
    fn test_summary_skips_deleted_and_excluded_files() {
        let diff = parse_diff(
            "diff --git a/gone.ts b/gone.ts\n\
             --- a/gone.ts\n\
             +++ /dev/null\n\
             @@ -1 +0,0 @@\n\
             -old\n\
             diff --git a/x.test.ts b/x.test.ts\n\
             --- a/x.test.ts\n\
             +++ b/x.test.ts\n\
             @@ -0,0 +1 @@\n\
             +a test line",
        );
        assert!(build_summary(&diff).trim().is_empty());
    }

    #[test]
    fn test_summary_truncates_at_line_budget() {
        let body: String = (0..(MAX_SUMMARY_LINES + 50))
            .map(|i| format!("+line number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let raw = format!(
            "diff --git a/big.ts b/big.ts\n--- a/big.ts\n+++ b/big.ts\n@@ -0,0 +1,{} @@\n{}",
            MAX_SUMMARY_LINES + 50,
            body
        );
        let summary = build_summary(&parse_diff(&raw));
        assert!(summary.ends_with(TRUNCATION_NOTICE));
        // header + budget + notice
        assert_eq!(summary.lines().count(), MAX_SUMMARY_LINES + 2);
    }

    #[test]
    fn test_parse_response_validates_entries() {
        let diff = two_file_diff();
        let content = r#"{"comments": [
            {"filename": "src/auth.ts", "line": 2, "body": "possible issue", "severity": "warning"},
            {"filename": "not/in/diff.ts", "line": 1, "body": "dropped"},
            {"filename": "src/util.ts", "body": "missing line"},
            {"filename": "src/util.ts", "line": 2, "severity": "error"},
            {"filename": "src/util.ts", "line": 2, "body": "odd severity", "severity": "catastrophic"}
        ]}"#;
        let comments = parse_response(content, &diff, "AiLayer");
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].filename, "src/auth.ts");
        assert_eq!(comments[0].severity, Severity::Warning);
        assert_eq!(comments[1].body, "odd severity");
        assert_eq!(comments[1].severity, Severity::Info);
        assert_eq!(comments[1].source, "AiLayer");
    }

    #[test]
    fn test_parse_response_tolerates_garbage() {
        let diff = two_file_diff();
        assert!(parse_response("not json at all", &diff, "AiLayer").is_empty());
        assert!(parse_response("{}", &diff, "AiLayer").is_empty());
        assert!(parse_response(r#"{"comments": "nope"}"#, &diff, "AiLayer").is_empty());
    }

    #[tokio::test]
    async fn test_analyze_skips_network_call_for_empty_summary() {
        // Deletion-only diff produces an empty summary, so analyze returns
        // without touching the (invalid) endpoint.
        let diff = parse_diff(
            "diff --git a/gone.ts b/gone.ts\n--- a/gone.ts\n+++ /dev/null\n@@ -1 +0,0 @@\n-old",
        );
        let layer = AiLayer::new("not-a-real-key".to_string(), DEFAULT_MODEL.to_string());
        assert!(layer.analyze(&diff).await.is_empty());
    }
}
