//! One live session: its timeline, its store and its lifecycle.
//!
//! A [`Session`] is created by the manager once the packaged asset is usable
//! and starts out `Live`. From there it only moves forward:
//!
//! ```text
//! Live ──stop──▶ Stopping ──▶ Stopped
//!  │
//!  └─asset gone / late transcode failure / refresh crash──▶ Failed ──stop──▶ Stopped
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use loopcast_av::Workspace;
use loopcast_media::LiveWindow;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::{Error, Result};
use super::key::SegmentKey;
use super::manifest::{self, Manifest, SessionSnapshot};
use super::segment_store::{SegmentStore, StoreStats};

/// Path the manifest is served under.
pub const MANIFEST_PATH: &str = "/manifest";

/// Lifecycle state reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Live,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether a session in this state blocks another start.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Live)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Live => "live",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub sequence_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loops_completed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<StoreStats>,
}

impl SessionStatus {
    /// Status carrying only a state.
    pub fn bare(state: SessionState) -> Self {
        Self {
            state,
            sequence_number: 0,
            session_id: None,
            source: None,
            manifest_path: None,
            source_duration_secs: None,
            loops_completed: None,
            started_at: None,
            last_error: None,
            cache: None,
        }
    }
}

/// What a refresh tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A new manifest with this sequence number was published.
    Published(u64),
    /// A transient problem; the previous manifest stays.
    Skipped,
    /// The packaged asset is gone and the session can not continue.
    AssetGone(loopcast_av::Error),
}

/// Everything a session is built from.
pub struct SessionInit {
    pub id: Uuid,
    pub generation: u64,
    pub source: String,
    pub window: LiveWindow,
    pub store: SegmentStore,
    pub workspace: Workspace,
    pub refresh_interval: Duration,
}

pub struct Session {
    id: Uuid,
    generation: u64,
    source: String,
    window: LiveWindow,
    refresh_interval: Duration,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    state: RwLock<SessionState>,
    last_error: RwLock<Option<String>>,
    sequence: AtomicU64,
    store: SegmentStore,
    workspace: Mutex<Option<Workspace>>,
    cancel: CancellationToken,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a live session whose loop clock starts now.
    pub fn new(init: SessionInit) -> Self {
        Self {
            id: init.id,
            generation: init.generation,
            source: init.source,
            window: init.window,
            refresh_interval: init.refresh_interval,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            state: RwLock::new(SessionState::Live),
            last_error: RwLock::new(None),
            sequence: AtomicU64::new(0),
            store: init.store,
            workspace: Mutex::new(Some(init.workspace)),
            cancel: CancellationToken::new(),
            refresh: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn window(&self) -> &LiveWindow {
        &self.window
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn set_refresh_handle(&self, handle: JoinHandle<()>) {
        *self.refresh.lock() = Some(handle);
    }

    /// Publish the sequence-0 manifest.
    pub(crate) fn publish_initial(&self) {
        let manifest = manifest::render(&self.snapshot(0), self.started_at);
        self.store.publish_manifest(manifest);
    }

    fn snapshot(&self, sequence: u64) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            window: self.window,
            started_at: self.started_at,
            sequence,
        }
    }

    /// Next sequence number for a tick at `now`.
    ///
    /// Never less than one past the previous value; catches up with the
    /// number of elapsed refresh periods after skipped ticks.
    fn advance_sequence(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.started_at);
        let periods = elapsed.as_nanos() / self.refresh_interval.as_nanos().max(1);
        let periods = u64::try_from(periods).unwrap_or(u64::MAX);

        let previous = self.sequence.load(Ordering::Acquire);
        let next = previous.saturating_add(1).max(periods);
        self.sequence.store(next, Ordering::Release);
        next
    }

    /// Instant at which the window of `sequence` is taken: one refresh
    /// period per sequence number after the start.
    ///
    /// A given sequence number always maps to the same instant, whatever
    /// time the tick actually ran.
    fn instant_for(&self, sequence: u64) -> Instant {
        let nanos = self
            .refresh_interval
            .as_nanos()
            .saturating_mul(u128::from(sequence));
        let offset = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        self.started_at
            .checked_add(offset)
            .unwrap_or(self.started_at)
    }

    /// One refresh: advance the sequence for the tick scheduled at
    /// `deadline`, re-render the manifest and apply retention.
    ///
    /// Only the refresh task calls this.
    pub(crate) fn tick(&self, deadline: Instant) -> TickOutcome {
        if self.state() != SessionState::Live {
            return TickOutcome::Skipped;
        }

        if let Err(e) = self.store.source().check_available() {
            if e.is_missing_file() {
                return TickOutcome::AssetGone(e);
            }
            tracing::warn!(session_id = %self.id, "Skipping refresh tick: {}", e);
            return TickOutcome::Skipped;
        }

        let sequence = self.advance_sequence(deadline);
        let manifest = manifest::render(&self.snapshot(sequence), self.instant_for(sequence));
        self.store.publish_manifest(manifest);
        self.store.sweep();
        self.store.check_memory_pressure();

        tracing::trace!(session_id = %self.id, sequence, "Published manifest");
        TickOutcome::Published(sequence)
    }

    /// Current manifest, while live.
    pub fn manifest(&self) -> Result<std::sync::Arc<Manifest>> {
        if self.state() != SessionState::Live {
            return Err(Error::not_found("manifest"));
        }
        self.store.manifest().ok_or_else(|| Error::not_found("manifest"))
    }

    /// Bytes of one segment of this session.
    pub async fn segment(&self, key: SegmentKey) -> Result<Bytes> {
        if key.generation != self.generation || self.state() != SessionState::Live {
            return Err(Error::not_found(format!("segment {key}")));
        }

        let timeline = self.window.timeline();
        let start = key.start();
        if !timeline.is_valid_start(start) {
            return Err(Error::not_found(format!("segment {key}")));
        }

        self.store
            .get_or_extract(key, timeline.slice_len(start))
            .await
    }

    /// Mark the session failed and release its resources.
    ///
    /// Does not wait for the refresh task; it may be the caller.
    pub(crate) fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Stopping | SessionState::Stopped) {
                return;
            }
            *state = SessionState::Failed;
        }
        tracing::error!(session_id = %self.id, "Session failed: {}", reason);
        *self.last_error.write() = Some(reason);

        self.cancel.cancel();
        self.store.close();
        self.release_workspace();
    }

    /// Stop the session. Safe to call repeatedly.
    ///
    /// The refresh task is cancelled and awaited before the packaged asset
    /// is released.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Stopped {
                return;
            }
            *state = SessionState::Stopping;
        }

        self.cancel.cancel();
        let handle = self.refresh.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(session_id = %self.id, "Refresh task ended abnormally: {}", e);
            }
        }

        self.store.close();
        self.release_workspace();

        *self.state.write() = SessionState::Stopped;
        tracing::info!(session_id = %self.id, "Session stopped");
    }

    fn release_workspace(&self) {
        let workspace = self.workspace.lock().take();
        if let Some(workspace) = workspace {
            let path = workspace.path().to_path_buf();
            match workspace.close() {
                Ok(()) => tracing::debug!(path = %path.display(), "Released packaged asset"),
                Err(e) => tracing::warn!("Failed to release packaged asset: {}", e),
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        let elapsed = Instant::now().saturating_duration_since(self.started_at);
        let timeline = self.window.timeline();

        SessionStatus {
            state,
            sequence_number: self.sequence(),
            session_id: Some(self.id),
            source: Some(self.source.clone()),
            manifest_path: (state == SessionState::Live).then(|| MANIFEST_PATH.to_string()),
            source_duration_secs: Some(timeline.source_duration().as_secs_f64()),
            loops_completed: (state == SessionState::Live)
                .then(|| timeline.clock().loops_completed(elapsed)),
            started_at: Some(self.started_at_utc),
            last_error: self.last_error.read().clone(),
            cache: Some(self.store.stats()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::memory::FixedMemory;
    use crate::streaming::segment_store::RetentionPolicy;
    use crate::streaming::source::SplitFiles;
    use loopcast_media::Timeline;
    use std::sync::Arc;

    fn session(dir: &std::path::Path) -> Session {
        session_on(dir, true)
    }

    fn session_on(dir: &std::path::Path, aligned: bool) -> Session {
        let workspace = Workspace::create_in(dir).unwrap();
        let segments = workspace.segment_dir();
        std::fs::create_dir_all(&segments).unwrap();
        std::fs::write(segments.join("seg00001.ts"), b"one").unwrap();

        let timeline = Timeline::new(Duration::from_secs(30), Duration::from_secs(5), aligned).unwrap();
        let store = SegmentStore::new(
            Arc::new(SplitFiles::new(segments, Duration::from_secs(5))),
            RetentionPolicy::default(),
            Arc::new(FixedMemory(None)),
            None,
        );
        Session::new(SessionInit {
            id: Uuid::new_v4(),
            generation: 2,
            source: "file:///clip.mp4".to_string(),
            window: LiveWindow::new(timeline, 3).unwrap(),
            store,
            workspace,
            refresh_interval: Duration::from_secs(5),
        })
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SessionState::Live).unwrap(), "\"live\"");
        assert_eq!(SessionState::Failed.to_string(), "failed");
        assert!(SessionState::Starting.is_active());
        assert!(!SessionState::Failed.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_catches_up_after_skipped_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let start = session.started_at();

        assert_eq!(session.advance_sequence(start + Duration::from_secs(5)), 1);
        assert_eq!(session.advance_sequence(start + Duration::from_secs(6)), 2);
        assert_eq!(session.advance_sequence(start + Duration::from_secs(30)), 6);
        assert_eq!(session.advance_sequence(start + Duration::from_secs(30)), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_tick_renders_on_the_sequence_grid() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_on(dir.path(), false);
        session.publish_initial();
        let start = session.started_at();

        // Woken 1.5s late: still sequence 1, still the window at 5s.
        let outcome = session.tick(start + Duration::from_millis(6_500));
        assert!(matches!(outcome, TickOutcome::Published(1)));
        let first = session.manifest().unwrap();
        assert!(first.body.contains("#EXT-X-MEDIA-SEQUENCE:1\n"));
        assert!(first.body.contains("/segment/2-5000.ts\n#EXTINF"));

        let outcome = session.tick(start + Duration::from_millis(10_001));
        assert!(matches!(outcome, TickOutcome::Published(2)));
        let second = session.manifest().unwrap();
        let uris: Vec<&str> = second
            .body
            .lines()
            .filter(|l| l.starts_with("/segment/"))
            .collect();
        assert_eq!(
            uris,
            vec!["/segment/2-10000.ts", "/segment/2-15000.ts", "/segment/2-20000.ts"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_key_validation() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        let ok = session
            .segment(SegmentKey::new(2, Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(&ok[..], b"one");

        for key in [
            SegmentKey::new(1, Duration::from_secs(5)),
            SegmentKey::new(2, Duration::from_secs(30)),
            SegmentKey::new(2, Duration::from_millis(7_300)),
        ] {
            let err = session.segment(key).await.unwrap_err();
            assert!(matches!(err, Error::NotFound(_)), "{key}: {err}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_fails_when_asset_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.publish_initial();

        let outcome = session.tick(session.started_at() + Duration::from_secs(5));
        assert!(matches!(outcome, TickOutcome::Published(1)));

        let segments = session.workspace.lock().as_ref().unwrap().segment_dir();
        std::fs::remove_dir_all(&segments).unwrap();
        match session.tick(session.started_at() + Duration::from_secs(10)) {
            TickOutcome::AssetGone(e) => session.fail(e.to_string()),
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(session.manifest(), Err(Error::NotFound(_))));
        assert!(session.status().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_releases_asset() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let path = session.workspace.lock().as_ref().unwrap().path().to_path_buf();
        session.publish_initial();
        assert!(session.manifest().is_ok());

        session.stop().await;
        session.stop().await;

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!path.exists());
        assert!(session.manifest().is_err());
        assert!(session.status().manifest_path.is_none());
    }
}
