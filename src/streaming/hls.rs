//! HLS handlers for the live session.
//!
//! Both responses carry `Cache-Control: no-cache`: the manifest changes on
//! every tick, and segment keys are only meaningful for the session that
//! issued them.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::server::error::AppError;
use crate::server::AppContext;

const MPEGURL: &str = "application/vnd.apple.mpegurl";
const MPEG_TS: &str = "video/mp2t";

/// Serve the manifest currently on air.
pub async fn live_manifest(State(ctx): State<AppContext>) -> Result<Response, AppError> {
    let manifest = ctx.sessions.manifest()?;

    Ok((
        [
            (header::CONTENT_TYPE, MPEGURL),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        manifest.body.clone(),
    )
        .into_response())
}

/// Serve one segment, extracting it on first request.
pub async fn live_segment(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let bytes = ctx.sessions.segment(&key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, MPEG_TS),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}
