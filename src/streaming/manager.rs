//! The live session manager.
//!
//! [`LiveSessionManager`] is the single owner of the current session. It is a
//! cheap clone handle meant to live in the HTTP state. Control operations
//! (`start`, `stop`) are serialized; reads (`status`, `manifest`, `segment`)
//! only take short synchronous locks and never wait for a control operation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use loopcast_av::{TranscodeInvoker, TranscodeOptions, Workspace};
use loopcast_media::{LiveWindow, Timeline};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::task::AbortOnDropHandle;
use uuid::Uuid;

use super::error::{Error, Result};
use super::key::SegmentKey;
use super::manifest::Manifest;
use super::memory::MemoryGauge;
use super::refresh::{self, TranscodeHandle};
use super::segment_store::{RetentionPolicy, SegmentStore};
use super::session::{Session, SessionInit, SessionState, SessionStatus};
use super::source;

/// How the packaged asset is laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagingMode {
    /// One MPEG-TS file; slices are cut on demand at any offset.
    #[default]
    Sliced,
    /// Numbered files of one segment duration each.
    PreSplit,
}

/// What `start` does while another session is starting or live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Refuse with [`Error::AlreadyActive`].
    #[default]
    Reject,
    /// Stop the current session, then start the new one.
    Replace,
}

/// Settings shared by every session the manager starts.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub mode: PackagingMode,
    pub segment_duration: Duration,
    pub window_size: usize,
    pub refresh_interval: Duration,
    /// How long `start` waits for packaging before promoting optimistically.
    pub start_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
    pub work_dir: PathBuf,
    pub retention: RetentionPolicy,
    /// Resident memory above which the segment cache is dropped.
    pub memory_high_water: Option<u64>,
    pub transcode: TranscodeOptions,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            mode: PackagingMode::Sliced,
            segment_duration: Duration::from_secs(5),
            window_size: 3,
            refresh_interval: Duration::from_secs(5),
            start_timeout: Duration::from_secs(60),
            conflict_policy: ConflictPolicy::Reject,
            work_dir: std::env::temp_dir().join("loopcast"),
            retention: RetentionPolicy::default(),
            memory_high_water: None,
            transcode: TranscodeOptions::default(),
        }
    }
}

/// Per-request overrides of the configured transcode options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StartOptions {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
}

impl StartOptions {
    /// Overlay these overrides on `base`.
    pub fn apply(&self, base: &TranscodeOptions) -> TranscodeOptions {
        let mut options = base.clone();
        if let Some(codec) = &self.video_codec {
            options.video_codec = codec.clone();
        }
        if let Some(codec) = &self.audio_codec {
            options.audio_codec = codec.clone();
        }
        if self.video_bitrate.is_some() {
            options.video_bitrate = self.video_bitrate.clone();
        }
        if self.audio_bitrate.is_some() {
            options.audio_bitrate = self.audio_bitrate.clone();
        }
        options
    }
}

#[derive(Clone)]
enum Slot {
    Idle,
    Starting {
        id: Uuid,
        source: String,
    },
    StartFailed {
        id: Uuid,
        source: String,
        error: String,
    },
    Session(Arc<Session>),
}

impl Slot {
    fn is_active(&self) -> bool {
        match self {
            Self::Starting { .. } => true,
            Self::Session(session) => session.state().is_active(),
            Self::Idle | Self::StartFailed { .. } => false,
        }
    }
}

struct Inner {
    invoker: Arc<dyn TranscodeInvoker>,
    memory: Arc<dyn MemoryGauge>,
    settings: StreamSettings,
    control: Mutex<()>,
    slot: RwLock<Slot>,
    generation: AtomicU64,
}

/// Owner of the one live session.
#[derive(Clone)]
pub struct LiveSessionManager {
    inner: Arc<Inner>,
}

impl LiveSessionManager {
    pub fn new(
        invoker: Arc<dyn TranscodeInvoker>,
        memory: Arc<dyn MemoryGauge>,
        settings: StreamSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                invoker,
                memory,
                settings,
                control: Mutex::new(()),
                slot: RwLock::new(Slot::Idle),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.inner.settings
    }

    /// The current session, if one exists in any state.
    pub fn session(&self) -> Option<Arc<Session>> {
        match &*self.inner.slot.read() {
            Slot::Session(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Start looping `source`.
    ///
    /// Returns once the first manifest is published, or with the error that
    /// prevented it. A failed start leaves nothing running.
    pub async fn start(&self, source: &str, options: StartOptions) -> Result<SessionStatus> {
        let policy = self.inner.settings.conflict_policy;
        if policy == ConflictPolicy::Reject && self.inner.slot.read().is_active() {
            return Err(Error::AlreadyActive);
        }

        let _control = self.inner.control.lock().await;

        let previous = self.inner.slot.read().clone();
        if let Slot::Session(session) = previous {
            if session.state().is_active() {
                if policy == ConflictPolicy::Reject {
                    return Err(Error::AlreadyActive);
                }
                tracing::info!(session_id = %session.id(), "Replacing live session");
            }
            session.stop().await;
        }

        let id = Uuid::new_v4();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.inner.slot.write() = Slot::Starting {
            id,
            source: source.to_string(),
        };
        tracing::info!(session_id = %id, generation, source, "Starting session");

        match self.launch(id, generation, source, &options).await {
            Ok(session) => {
                let status = session.status();
                *self.inner.slot.write() = Slot::Session(session);
                Ok(status)
            }
            Err(e) => {
                tracing::warn!(session_id = %id, "Start failed: {}", e);
                *self.inner.slot.write() = Slot::StartFailed {
                    id,
                    source: source.to_string(),
                    error: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        id: Uuid,
        generation: u64,
        source: &str,
        options: &StartOptions,
    ) -> Result<Arc<Session>> {
        let settings = &self.inner.settings;
        let invoker = &self.inner.invoker;

        loopcast_av::validate_source(source).map_err(|e| Error::invalid_request(e.to_string()))?;
        let transcode_options = options.apply(&settings.transcode);
        transcode_options
            .validate()
            .map_err(|e| Error::invalid_request(e.to_string()))?;

        let duration = invoker.probe_duration(source).await.map_err(Error::Probe)?;
        let pre_split = settings.mode == PackagingMode::PreSplit;
        let timeline = Timeline::new(duration, settings.segment_duration, pre_split)?;
        // Window bounds are a settings problem, not a property of the source.
        let window = LiveWindow::new(timeline, settings.window_size)
            .map_err(|e| Error::Internal(format!("invalid stream settings: {e}")))?;
        tracing::debug!(
            session_id = %id,
            duration_ms = duration.as_millis() as u64,
            "Probed source"
        );

        let workspace = Workspace::create_in(&settings.work_dir).map_err(Error::Workspace)?;
        let target = workspace.output_target(pre_split.then_some(timeline.segment_duration()));

        let mut transcode: TranscodeHandle = {
            let invoker = invoker.clone();
            let source = source.to_string();
            let target = target.clone();
            AbortOnDropHandle::new(tokio::spawn(async move {
                invoker
                    .transcode(&source, &target, &transcode_options)
                    .await
            }))
        };

        let waited = tokio::time::timeout(settings.start_timeout, &mut transcode).await;
        let transcode = match waited {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => return Err(Error::Transcode(e)),
            Ok(Err(e)) => return Err(Error::Internal(format!("transcode task failed: {e}"))),
            Err(_) if target.is_ready() => {
                tracing::info!(
                    session_id = %id,
                    "Packaging still running after start timeout, going live with partial output"
                );
                Some(transcode)
            }
            Err(_) => {
                return Err(Error::Transcode(loopcast_av::Error::TimedOut {
                    tool: "ffmpeg".to_string(),
                    timeout: settings.start_timeout,
                }))
            }
        };

        if transcode.is_none() && !target.is_ready() {
            return Err(Error::Transcode(loopcast_av::Error::tool_failed(
                "ffmpeg",
                "packaging produced no output",
            )));
        }

        let store = SegmentStore::new(
            source::for_target(&target, invoker.clone(), transcode.is_none()),
            settings.retention,
            self.inner.memory.clone(),
            settings.memory_high_water,
        );
        let session = Arc::new(Session::new(SessionInit {
            id,
            generation,
            source: source.to_string(),
            window,
            store,
            workspace,
            refresh_interval: settings.refresh_interval,
        }));

        session.publish_initial();
        refresh::spawn(session.clone(), transcode);
        tracing::info!(session_id = %id, "Session live");

        Ok(session)
    }

    /// Stop the current session, if any. Safe to call at any time.
    pub async fn stop(&self) -> SessionStatus {
        let _control = self.inner.control.lock().await;

        let current = self.inner.slot.read().clone();
        match current {
            Slot::Session(session) => {
                session.stop().await;
                session.status()
            }
            Slot::StartFailed { .. } => {
                *self.inner.slot.write() = Slot::Idle;
                SessionStatus::bare(SessionState::Stopped)
            }
            Slot::Idle => SessionStatus::bare(SessionState::Idle),
            // Unreachable while the control lock is held.
            Slot::Starting { .. } => SessionStatus::bare(SessionState::Starting),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.inner.slot.read() {
            Slot::Idle => SessionStatus::bare(SessionState::Idle),
            Slot::Starting { id, source } => SessionStatus {
                session_id: Some(*id),
                source: Some(source.clone()),
                ..SessionStatus::bare(SessionState::Starting)
            },
            Slot::StartFailed { id, source, error } => SessionStatus {
                session_id: Some(*id),
                source: Some(source.clone()),
                last_error: Some(error.clone()),
                ..SessionStatus::bare(SessionState::Failed)
            },
            Slot::Session(session) => session.status(),
        }
    }

    /// The manifest currently on air.
    pub fn manifest(&self) -> Result<Arc<Manifest>> {
        self.session()
            .ok_or_else(|| Error::not_found("manifest"))?
            .manifest()
    }

    /// Bytes of the segment named `raw_key` (`{generation}-{offset}[.ts]`).
    pub async fn segment(&self, raw_key: &str) -> Result<Bytes> {
        let key: SegmentKey = raw_key
            .parse()
            .map_err(|_| Error::not_found(format!("segment {raw_key}")))?;
        let session = self
            .session()
            .ok_or_else(|| Error::not_found(format!("segment {raw_key}")))?;
        session.segment(key).await
    }
}
