use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::diff::parse_diff;
use crate::github::{DiffFetcher, PrContext, ReviewNotifier};
use crate::layers::ReviewLayer;
use crate::pipeline::ReviewPipeline;
use crate::review::ReviewComment;

/// Failures a change-driven run can surface to its caller. Raw-diff analysis
/// never fails; layer and parse trouble is absorbed further down.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A change-driven run was requested without the required collaborator.
    /// Retrying cannot help; the deployment is misconfigured.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    /// The hosting platform rejected a fetch or post. The caller decides
    /// whether to retry.
    #[error("external service call failed: {0}")]
    ExternalService(anyhow::Error),
}

impl OrchestratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::ExternalService(_))
    }
}

/// Composition root of the review pipeline: owns the configured layers and,
/// for change-driven runs, the fetcher and notifier collaborators. Holds no
/// mutable state between invocations.
pub struct ReviewOrchestrator {
    pipeline: ReviewPipeline,
    fetcher: Option<Arc<dyn DiffFetcher>>,
    notifier: Option<Arc<dyn ReviewNotifier>>,
}

impl ReviewOrchestrator {
    pub fn new(layers: Vec<Arc<dyn ReviewLayer>>) -> Self {
        ReviewOrchestrator {
            pipeline: ReviewPipeline::new(layers),
            fetcher: None,
            notifier: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn DiffFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReviewNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Parse a raw diff and run the review pipeline over it.
    ///
    /// A diff with no added lines returns an empty list immediately, without
    /// invoking any layer.
    pub async fn analyze_raw_diff(&self, raw_diff: &str) -> Vec<ReviewComment> {
        let parsed = parse_diff(raw_diff);

        if !parsed.has_additions() {
            info!("No additions found, skipping analysis");
            return Vec::new();
        }

        self.pipeline.run(&parsed).await
    }

    /// Fetch the change's diff, analyze it, and post any resulting comments
    /// back to the platform.
    pub async fn handle_pull_request(&self, ctx: &PrContext) -> Result<(), OrchestratorError> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or(OrchestratorError::NotConfigured("diff fetcher"))?;
        let notifier = self
            .notifier
            .as_ref()
            .ok_or(OrchestratorError::NotConfigured("review notifier"))?;

        let raw_diff = fetcher
            .fetch_diff(ctx)
            .await
            .map_err(OrchestratorError::ExternalService)?;

        let comments = self.analyze_raw_diff(&raw_diff).await;
        info!(
            count = comments.len(),
            "Review finished for {}/{}#{}", ctx.owner, ctx.repo, ctx.pull_number
        );

        if !comments.is_empty() {
            notifier
                .post_review(ctx, &comments)
                .await
                .map_err(OrchestratorError::ExternalService)?;
        }

        Ok(())
    }
}
