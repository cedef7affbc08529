//! Session control routes.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::error::AppError;
use crate::server::AppContext;
use crate::streaming::{SessionState, StartOptions, MANIFEST_PATH};

pub fn control_routes() -> Router<AppContext> {
    Router::new()
        .route("/start", post(start_stream))
        .route("/stop", post(stop_stream))
        .route("/status", get(stream_status))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    source: String,
    #[serde(default)]
    options: StartOptions,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    state: SessionState,
    manifest_url: String,
    session_id: Option<Uuid>,
}

async fn start_stream(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    let source = payload.source.trim();
    let status = ctx.sessions.start(source, payload.options).await?;

    Ok(Json(StartResponse {
        state: status.state,
        manifest_url: manifest_url(ctx.config.server.public_url.as_deref(), &headers),
        session_id: status.session_id,
    }))
}

async fn stop_stream(State(ctx): State<AppContext>) -> impl IntoResponse {
    let status = ctx.sessions.stop().await;
    Json(serde_json::json!({ "state": status.state }))
}

async fn stream_status(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(ctx.sessions.status())
}

/// Absolute manifest URL for the client that asked.
fn manifest_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = public_url {
        return format!("{}{}", base.trim_end_matches('/'), MANIFEST_PATH);
    }

    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{MANIFEST_PATH}"),
        None => MANIFEST_PATH.to_string(),
    }
}
