use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

use crate::review::ReviewComment;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const DIFF_ACCEPT_HEADER: &str = "application/vnd.github.v3.diff";
const JSON_ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// Reviews are capped to this many comments; beyond it the highest-severity
/// comments win and the summary notes the true total.
const MAX_REVIEW_COMMENTS: usize = 30;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity of the change under review.
#[derive(Debug, Clone)]
pub struct PrContext {
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
    pub head_sha: String,
    /// Set on update events; enables an incremental diff that avoids
    /// re-reviewing unchanged content.
    pub previous_sha: Option<String>,
    pub title: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
}

/// Supplies the raw unified diff for a change.
#[async_trait]
pub trait DiffFetcher: Send + Sync {
    async fn fetch_diff(&self, ctx: &PrContext) -> Result<String>;
}

/// Consumes the final comment list and posts it back to the platform.
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn post_review(&self, ctx: &PrContext, comments: &[ReviewComment]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest {
    commit_id: String,
    body: String,
    event: String,
    comments: Vec<GitHubReviewComment>,
}

#[derive(Debug, Serialize)]
struct GitHubReviewComment {
    path: String,
    line: u32,
    side: String,
    body: String,
}

/// GitHub REST client implementing both collaborator capabilities: fetching
/// diffs (read) and posting reviews (write).
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl GitHubClient {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("reviewbot/0.1.0")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        GitHubClient {
            client,
            token,
            base_url: GITHUB_API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl DiffFetcher for GitHubClient {
    async fn fetch_diff(&self, ctx: &PrContext) -> Result<String> {
        // Incremental diff between revisions on update events; the full PR
        // diff otherwise.
        let url = match &ctx.previous_sha {
            Some(previous) => {
                info!(
                    "Fetching incremental diff {}...{} for {}/{}#{}",
                    &previous[..previous.len().min(7)],
                    &ctx.head_sha[..ctx.head_sha.len().min(7)],
                    ctx.owner,
                    ctx.repo,
                    ctx.pull_number
                );
                format!(
                    "{}/repos/{}/{}/compare/{}...{}",
                    self.base_url, ctx.owner, ctx.repo, previous, ctx.head_sha
                )
            }
            None => {
                info!(
                    "Fetching full diff for {}/{}#{}",
                    ctx.owner, ctx.repo, ctx.pull_number
                );
                format!(
                    "{}/repos/{}/{}/pulls/{}",
                    self.base_url, ctx.owner, ctx.repo, ctx.pull_number
                )
            }
        };

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", DIFF_ACCEPT_HEADER)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .context("Failed to send diff request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub API error fetching diff: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub API error fetching diff: {} - {}",
                status,
                error_text
            ));
        }

        let diff = response
            .text()
            .await
            .context("Failed to read diff response body")?;
        info!("Successfully fetched diff ({} bytes)", diff.len());

        Ok(diff)
    }
}

#[async_trait]
impl ReviewNotifier for GitHubClient {
    async fn post_review(&self, ctx: &PrContext, comments: &[ReviewComment]) -> Result<()> {
        if comments.is_empty() {
            return Ok(());
        }

        let (selected, truncated) = select_comments(comments);
        let body = if truncated {
            format!(
                "AI Code Review — found {} issue(s), showing top {} by severity.",
                comments.len(),
                selected.len()
            )
        } else {
            format!("AI Code Review — found {} issue(s).", comments.len())
        };

        let request_body = CreateReviewRequest {
            commit_id: ctx.head_sha.clone(),
            body,
            event: "COMMENT".to_string(),
            comments: selected
                .iter()
                .map(|c| GitHubReviewComment {
                    path: c.filename.clone(),
                    line: c.line,
                    side: "RIGHT".to_string(),
                    body: format_comment(c),
                })
                .collect(),
        };

        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.base_url, ctx.owner, ctx.repo, ctx.pull_number
        );

        info!(
            "Posting review with {} comment(s) to {}/{}#{}",
            selected.len(),
            ctx.owner,
            ctx.repo,
            ctx.pull_number
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", JSON_ACCEPT_HEADER)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&request_body)
            .send()
            .await
            .context("Failed to send review request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub API error posting review: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub API error posting review: {} - {}",
                status,
                error_text
            ));
        }

        info!("Successfully posted review");
        Ok(())
    }
}

/// Applies the platform comment cap: severity-sorted (error first, stable
/// within a severity), top N kept. Returns whether anything was cut.
fn select_comments(comments: &[ReviewComment]) -> (Vec<&ReviewComment>, bool) {
    let mut sorted: Vec<&ReviewComment> = comments.iter().collect();
    sorted.sort_by_key(|c| std::cmp::Reverse(c.severity));
    let truncated = sorted.len() > MAX_REVIEW_COMMENTS;
    sorted.truncate(MAX_REVIEW_COMMENTS);
    (sorted, truncated)
}

/// Severity marker and producing layer prefixed to the posted body.
fn format_comment(comment: &ReviewComment) -> String {
    format!(
        "{} **{}** ({})\n\n{}",
        comment.severity.marker(),
        comment.severity.as_str().to_uppercase(),
        comment.source,
        comment.body
    )
}
