pub mod diff;
pub mod github;
pub mod layers;
pub mod orchestrator;
pub mod pipeline;
pub mod review;

pub use diff::{parse_diff, DiffLine, DiffLineKind, FileDiff, FileStatus, Hunk, ParsedDiff};
pub use github::{DiffFetcher, GitHubClient, PrContext, ReviewNotifier};
pub use layers::{
    AiLayer, HeuristicLayer, HeuristicThresholds, PatternLayer, PatternRule, ReviewLayer,
};
pub use orchestrator::{OrchestratorError, ReviewOrchestrator};
pub use pipeline::ReviewPipeline;
pub use review::{ReviewComment, Severity};
