//! The seam between session management and the transcoding engine.
//!
//! Session code only sees [`TranscodeInvoker`]. [`FfmpegInvoker`] is the
//! production implementation; tests substitute their own.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::actions;
use crate::error::Result;
use crate::options::{validate_source, OutputTarget, TranscodeOptions};
use crate::probe;
use crate::tools::ToolRegistry;

/// Operations loopcast needs from a transcoding engine.
#[async_trait]
pub trait TranscodeInvoker: Send + Sync {
    /// Measure the playable duration of `source`.
    async fn probe_duration(&self, source: &str) -> Result<Duration>;

    /// Package `source` into `target`. Completes when the engine exits.
    async fn transcode(
        &self,
        source: &str,
        target: &OutputTarget,
        options: &TranscodeOptions,
    ) -> Result<()>;

    /// Cut `[start, start + length)` out of a packaged file.
    async fn extract_range(&self, asset: &Path, start: Duration, length: Duration)
        -> Result<Bytes>;
}

/// Deadlines for each kind of invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerTimeouts {
    pub probe: Duration,
    pub transcode: Duration,
    pub extract: Duration,
}

impl Default for InvokerTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(30),
            transcode: Duration::from_secs(3600),
            extract: Duration::from_secs(20),
        }
    }
}

/// [`TranscodeInvoker`] backed by the ffmpeg and ffprobe CLIs.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeouts: InvokerTimeouts,
}

impl FfmpegInvoker {
    /// Build an invoker from discovered tools.
    pub fn new(tools: &ToolRegistry, timeouts: InvokerTimeouts) -> Result<Self> {
        Ok(Self {
            ffmpeg: tools.require("ffmpeg")?.to_path_buf(),
            ffprobe: tools.require("ffprobe")?.to_path_buf(),
            timeouts,
        })
    }

    pub fn timeouts(&self) -> InvokerTimeouts {
        self.timeouts
    }
}

#[async_trait]
impl TranscodeInvoker for FfmpegInvoker {
    async fn probe_duration(&self, source: &str) -> Result<Duration> {
        validate_source(source)?;
        probe::probe_duration(&self.ffprobe, self.timeouts.probe, source).await
    }

    async fn transcode(
        &self,
        source: &str,
        target: &OutputTarget,
        options: &TranscodeOptions,
    ) -> Result<()> {
        validate_source(source)?;
        actions::package(&self.ffmpeg, self.timeouts.transcode, source, target, options).await
    }

    async fn extract_range(
        &self,
        asset: &Path,
        start: Duration,
        length: Duration,
    ) -> Result<Bytes> {
        actions::slice(&self.ffmpeg, self.timeouts.extract, asset, start, length).await
    }
}
