use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};

use reviewbot_core::{PrContext, ReviewComment};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GitHubWebhookPayload {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    /// Head sha of the previous revision; present on synchronize events.
    pub before: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub title: Option<String>,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct WebhookForm {
    payload: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub diff: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub success: bool,
    pub count: usize,
    pub comments: Vec<ReviewComment>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if !signature.starts_with("sha256=") {
        return false;
    }

    let signature_hex = &signature[7..];

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time verification
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// GitHub can deliver webhooks either as JSON or form-encoded with the JSON
/// in a `payload` field.
fn parse_webhook_payload(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<GitHubWebhookPayload, String> {
    if content_type
        .map(|ct| ct.contains("application/x-www-form-urlencoded"))
        .unwrap_or(false)
    {
        let form: WebhookForm = serde_urlencoded::from_bytes(body)
            .map_err(|e| format!("invalid form body: {}", e))?;
        serde_json::from_str(&form.payload).map_err(|e| format!("invalid payload JSON: {}", e))
    } else {
        serde_json::from_slice(body).map_err(|e| format!("invalid JSON body: {}", e))
    }
}

/// Builds the change identity from a webhook payload, or `None` when the
/// payload lacks the required PR fields.
fn pr_context_from(payload: &GitHubWebhookPayload) -> Option<PrContext> {
    let pull_request = payload.pull_request.as_ref()?;
    let repository = payload.repository.as_ref()?;
    let number = payload.number?;

    let previous_sha = if payload.action.as_deref() == Some("synchronize") {
        payload.before.clone()
    } else {
        None
    };

    Some(PrContext {
        owner: repository.owner.login.clone(),
        repo: repository.name.clone(),
        pull_number: number,
        head_sha: pull_request.head.sha.clone(),
        previous_sha,
        title: pull_request.title.clone(),
        base_branch: Some(pull_request.base.ref_name.clone()),
        head_branch: Some(pull_request.head.ref_name.clone()),
    })
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReviewRequest>,
) -> Json<ReviewResponse> {
    let comments = state.orchestrator.analyze_raw_diff(&request.diff).await;
    Json(ReviewResponse {
        success: true,
        count: comments.len(),
        comments,
    })
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let payload = match parse_webhook_payload(content_type, &body) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to parse webhook payload: {}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let action = payload.action.as_deref().unwrap_or("");
    info!("Received {} event", action);

    if !matches!(action, "opened" | "synchronize") {
        return Ok(Json(WebhookResponse {
            received: true,
            skipped: Some(true),
        }));
    }

    let Some(ctx) = pr_context_from(&payload) else {
        warn!("Webhook payload is missing PR data, skipping");
        return Ok(Json(WebhookResponse {
            received: true,
            skipped: Some(true),
        }));
    };

    info!(
        "Reviewing {}/{}#{} ({})",
        ctx.owner,
        ctx.repo,
        ctx.pull_number,
        ctx.title.as_deref().unwrap_or("<no title>")
    );

    // Acknowledge before processing; GitHub enforces a short delivery
    // timeout. Failures are logged, never re-raised past this handler.
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        match orchestrator.handle_pull_request(&ctx).await {
            Ok(()) => info!(
                "Review completed for {}/{}#{}",
                ctx.owner, ctx.repo, ctx.pull_number
            ),
            Err(e) => error!(error = %e, "Pull request review failed"),
        }
    });

    Ok(Json(WebhookResponse {
        received: true,
        skipped: None,
    }))
}

pub fn review_router(state: Arc<AppState>) -> Router {
    let webhook = Router::new()
        .route("/api/review/webhook", post(webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            verify_webhook_signature,
        ));

    Router::new()
        .route("/api/review", post(analyze_handler))
        .merge(webhook)
        .with_state(state)
}
