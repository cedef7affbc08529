//! Live looping of a finite source.
//!
//! A source is probed and packaged once, then presented as an endless live
//! HLS stream: the position on air is the time since start modulo the source
//! duration, and the manifest is re-rendered on a timer.
//!
//! # Routes
//!
//! - `GET /manifest` (also `/manifest.m3u8`) - Current sliding-window playlist
//! - `GET /segment/{generation}-{offset_ms}.ts` - One slice of the source

mod error;
mod hls;
mod key;
mod manager;
mod manifest;
mod memory;
mod refresh;
mod segment_store;
mod session;
mod source;

pub use error::{Error, Result};
pub use hls::{live_manifest, live_segment};
pub use key::{ParseKeyError, SegmentKey};
pub use manager::{ConflictPolicy, LiveSessionManager, PackagingMode, StartOptions, StreamSettings};
pub use manifest::{render, Manifest, SessionSnapshot};
pub use memory::{FixedMemory, MemoryGauge, ProcessMemory};
pub use segment_store::{RetentionPolicy, SegmentStore, StoreStats};
pub use session::{Session, SessionState, SessionStatus, MANIFEST_PATH};
pub use source::{SegmentSource, SlicedAsset, SplitFiles};

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create the live HLS router.
pub fn hls_router() -> Router<AppContext> {
    Router::new()
        .route("/manifest", get(live_manifest))
        .route("/manifest.m3u8", get(live_manifest))
        .route("/segment/:key", get(live_segment))
}
