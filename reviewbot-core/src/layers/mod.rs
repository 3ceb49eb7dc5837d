use async_trait::async_trait;

use crate::diff::ParsedDiff;
use crate::review::ReviewComment;

pub mod ai;
pub mod heuristic;
pub mod pattern;

pub use ai::AiLayer;
pub use heuristic::{HeuristicLayer, HeuristicThresholds};
pub use pattern::{PatternLayer, PatternRule};

/// A pluggable analyzer over a parsed diff.
///
/// Layers must never fail: on internal trouble an implementation returns an
/// empty list (the pipeline additionally isolates panics and timeouts as a
/// second line of defense). Implementations must not mutate shared state, so
/// the pipeline is free to run them concurrently against the same diff.
#[async_trait]
pub trait ReviewLayer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, diff: &ParsedDiff) -> Vec<ReviewComment>;
}
