pub mod config;
pub mod webhook;

use std::sync::Arc;

use reviewbot_core::ReviewOrchestrator;

pub struct AppState {
    pub orchestrator: Arc<ReviewOrchestrator>,
    pub webhook_secret: String,
}
