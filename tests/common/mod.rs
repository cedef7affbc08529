//! Shared test harness for integration tests.
//!
//! Provides [`FakeInvoker`], a scripted stand-in for ffmpeg with call
//! counters, and [`TestHarness`], which wires it into a
//! [`LiveSessionManager`]. The [`TestHarness::with_server`] constructor also
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use loopcast::config::Config;
use loopcast::server::{create_router, AppContext};
use loopcast::streaming::{FixedMemory, LiveSessionManager, StreamSettings};
use loopcast_av::{OutputTarget, TranscodeInvoker, TranscodeOptions};

/// Scripted transcode engine.
pub struct FakeInvoker {
    pub duration: Mutex<Option<Duration>>,
    /// Extraction fails for these start offsets (ms).
    pub failing_offsets: Mutex<HashSet<u64>>,
    /// Time packaging takes after writing its output.
    pub transcode_delay: Duration,
    /// Whether packaging writes anything before `transcode_delay`.
    pub writes_output: bool,
    pub transcode_fails: bool,
    pub extract_delay: Duration,
    pub probe_calls: AtomicUsize,
    pub transcode_calls: AtomicUsize,
    pub extract_calls: AtomicUsize,
}

impl FakeInvoker {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Mutex::new(Some(duration)),
            failing_offsets: Mutex::new(HashSet::new()),
            transcode_delay: Duration::ZERO,
            writes_output: true,
            transcode_fails: false,
            extract_delay: Duration::ZERO,
            probe_calls: AtomicUsize::new(0),
            transcode_calls: AtomicUsize::new(0),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn secs(secs: u64) -> Self {
        Self::with_duration(Duration::from_secs(secs))
    }

    /// A source that can not be probed.
    pub fn unprobeable() -> Self {
        let invoker = Self::secs(0);
        *invoker.duration.lock() = None;
        invoker
    }

    pub fn fail_offset(&self, offset_ms: u64) {
        self.failing_offsets.lock().insert(offset_ms);
    }

    pub fn recover(&self) {
        self.failing_offsets.lock().clear();
    }

    pub fn extractions(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn transcodes(&self) -> usize {
        self.transcode_calls.load(Ordering::SeqCst)
    }

    fn write_output(&self, target: &OutputTarget) -> std::io::Result<()> {
        match target {
            OutputTarget::File(path) => std::fs::write(path, b"packaged"),
            OutputTarget::Segments {
                dir,
                segment_duration,
            } => {
                std::fs::create_dir_all(dir)?;
                let total = self.duration.lock().unwrap_or_default();
                let count = total.as_millis().div_ceil(segment_duration.as_millis().max(1));
                for index in 0..count as u64 {
                    std::fs::write(
                        OutputTarget::segment_path(dir, index),
                        format!("split-{index}"),
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TranscodeInvoker for FakeInvoker {
    async fn probe_duration(&self, source: &str) -> loopcast_av::Result<Duration> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let duration = *self.duration.lock();
        duration.ok_or_else(|| {
            loopcast_av::Error::parse_error("ffprobe", format!("no duration for {source}"))
        })
    }

    async fn transcode(
        &self,
        _source: &str,
        target: &OutputTarget,
        _options: &TranscodeOptions,
    ) -> loopcast_av::Result<()> {
        self.transcode_calls.fetch_add(1, Ordering::SeqCst);
        if self.writes_output {
            self.write_output(target)?;
        }
        if !self.transcode_delay.is_zero() {
            tokio::time::sleep(self.transcode_delay).await;
        }
        if self.transcode_fails {
            return Err(loopcast_av::Error::tool_failed(
                "ffmpeg",
                "exited with status 1: Invalid data found when processing input",
            ));
        }
        Ok(())
    }

    async fn extract_range(
        &self,
        asset: &Path,
        start: Duration,
        length: Duration,
    ) -> loopcast_av::Result<Bytes> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if !self.extract_delay.is_zero() {
            tokio::time::sleep(self.extract_delay).await;
        }
        if !asset.exists() {
            return Err(loopcast_av::Error::FileNotFound {
                path: asset.to_path_buf(),
            });
        }
        let start_ms = start.as_millis() as u64;
        if self.failing_offsets.lock().contains(&start_ms) {
            return Err(loopcast_av::Error::tool_failed("ffmpeg", "simulated failure"));
        }
        Ok(Bytes::from(format!(
            "slice-{start_ms}-{}",
            length.as_millis()
        )))
    }
}

/// Settings used by every test unless overridden.
pub fn test_settings(work_dir: &Path) -> StreamSettings {
    StreamSettings {
        segment_duration: Duration::from_secs(5),
        window_size: 3,
        refresh_interval: Duration::from_secs(5),
        start_timeout: Duration::from_secs(5),
        work_dir: work_dir.to_path_buf(),
        ..StreamSettings::default()
    }
}

/// A session manager driven by a [`FakeInvoker`].
pub struct TestHarness {
    pub sessions: LiveSessionManager,
    pub invoker: Arc<FakeInvoker>,
    pub work_dir: TempDir,
}

impl TestHarness {
    pub fn new(invoker: FakeInvoker) -> Self {
        Self::with_settings(invoker, |_| {})
    }

    pub fn with_settings(invoker: FakeInvoker, adjust: impl FnOnce(&mut StreamSettings)) -> Self {
        let work_dir = tempfile::tempdir().expect("failed to create work dir");
        let mut settings = test_settings(work_dir.path());
        adjust(&mut settings);

        let invoker = Arc::new(invoker);
        let sessions =
            LiveSessionManager::new(invoker.clone(), Arc::new(FixedMemory(None)), settings);

        Self {
            sessions,
            invoker,
            work_dir,
        }
    }

    /// Number of packaged assets currently on disk.
    pub fn assets_on_disk(&self) -> usize {
        std::fs::read_dir(self.work_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server(invoker: FakeInvoker) -> (Self, SocketAddr) {
        let harness = Self::new(invoker);
        let ctx = AppContext {
            config: Arc::new(Config::default()),
            sessions: harness.sessions.clone(),
        };
        let app = create_router(ctx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}
