use anyhow::Result;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use reviewbot_core::layers::ReviewLayer;
use reviewbot_core::{
    AiLayer, DiffFetcher, GitHubClient, HeuristicLayer, PatternLayer, ReviewNotifier,
    ReviewOrchestrator,
};
use reviewbot_server::config::Config;
use reviewbot_server::webhook::review_router;
use reviewbot_server::AppState;

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "reviewbot"
    })))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = Config::from_env()?;

    let mut layers: Vec<Arc<dyn ReviewLayer>> = vec![
        Arc::new(PatternLayer::default()),
        Arc::new(HeuristicLayer::default()),
    ];
    match &config.groq_api_key {
        Some(api_key) => {
            layers.push(Arc::new(AiLayer::new(
                api_key.clone(),
                config.groq_model.clone(),
            )));
            info!("AI review layer enabled (model: {})", config.groq_model);
        }
        None => info!("GROQ_API_KEY not set, AI review layer disabled"),
    }

    let github = Arc::new(GitHubClient::new(config.github_token.clone()));
    let orchestrator = ReviewOrchestrator::new(layers)
        .with_fetcher(Arc::clone(&github) as Arc<dyn DiffFetcher>)
        .with_notifier(github as Arc<dyn ReviewNotifier>);

    let state = Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        webhook_secret: config.webhook_secret.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(review_router(state))
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    info!("reviewbot listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
