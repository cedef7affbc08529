//! Where segment bytes come from on a cache miss.
//!
//! The segment store does not care how the packaged asset is laid out. It
//! asks a [`SegmentSource`] for the bytes of one slice:
//!
//! - [`SlicedAsset`]: one packaged file, cut on demand through the invoker.
//! - [`SplitFiles`]: numbered files written by the packager, read from disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use loopcast_av::{OutputTarget, TranscodeInvoker};

/// Produces the bytes of one slice of the packaged asset.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Bytes of `[start, start + length)`.
    async fn fetch(&self, start: Duration, length: Duration) -> loopcast_av::Result<Bytes>;

    /// Check that the packaged asset is still there.
    ///
    /// A missing asset is reported as a missing-file error; any other error is
    /// transient.
    fn check_available(&self) -> loopcast_av::Result<()>;

    /// The packager has exited cleanly; everything it wrote is final.
    fn mark_packaged(&self) {}
}

/// Build the source matching a packaging output target.
///
/// `packaged` is false while the packager is still writing the target.
pub fn for_target(
    target: &OutputTarget,
    invoker: Arc<dyn TranscodeInvoker>,
    packaged: bool,
) -> Arc<dyn SegmentSource> {
    match target {
        OutputTarget::File(path) => Arc::new(SlicedAsset::new(invoker, path.clone())),
        OutputTarget::Segments {
            dir,
            segment_duration,
        } if packaged => Arc::new(SplitFiles::new(dir.clone(), *segment_duration)),
        OutputTarget::Segments {
            dir,
            segment_duration,
        } => Arc::new(SplitFiles::in_progress(dir.clone(), *segment_duration)),
    }
}

/// Slices cut on demand from one packaged file.
pub struct SlicedAsset {
    invoker: Arc<dyn TranscodeInvoker>,
    asset: PathBuf,
}

impl SlicedAsset {
    pub fn new(invoker: Arc<dyn TranscodeInvoker>, asset: PathBuf) -> Self {
        Self { invoker, asset }
    }
}

#[async_trait]
impl SegmentSource for SlicedAsset {
    async fn fetch(&self, start: Duration, length: Duration) -> loopcast_av::Result<Bytes> {
        self.invoker.extract_range(&self.asset, start, length).await
    }

    fn check_available(&self) -> loopcast_av::Result<()> {
        check_path(&self.asset)
    }
}

/// Pre-split files named by slice index.
///
/// While the packager is running, a file is only final once the packager has
/// moved on to the next one.
pub struct SplitFiles {
    dir: PathBuf,
    segment_ms: u64,
    packaged: AtomicBool,
}

impl SplitFiles {
    /// Files from a finished packaging run.
    pub fn new(dir: PathBuf, segment_duration: Duration) -> Self {
        Self::with_state(dir, segment_duration, true)
    }

    /// Files a running packager is still producing.
    pub fn in_progress(dir: PathBuf, segment_duration: Duration) -> Self {
        Self::with_state(dir, segment_duration, false)
    }

    fn with_state(dir: PathBuf, segment_duration: Duration, packaged: bool) -> Self {
        Self {
            dir,
            segment_ms: (segment_duration.as_millis() as u64).max(1),
            packaged: AtomicBool::new(packaged),
        }
    }

    fn index_for(&self, start: Duration) -> u64 {
        start.as_millis() as u64 / self.segment_ms
    }

    /// Whether file `index` can no longer change.
    fn is_final(&self, index: u64) -> bool {
        self.packaged.load(Ordering::Acquire)
            || OutputTarget::segment_path(&self.dir, index + 1).exists()
    }
}

#[async_trait]
impl SegmentSource for SplitFiles {
    async fn fetch(&self, start: Duration, _length: Duration) -> loopcast_av::Result<Bytes> {
        let index = self.index_for(start);
        let path = OutputTarget::segment_path(&self.dir, index);
        if !self.is_final(index) {
            return Err(loopcast_av::Error::tool_failed(
                "ffmpeg",
                format!("{} is still being written", path.display()),
            ));
        }
        match tokio::fs::read(&path).await {
            Ok(data) if data.is_empty() => Err(loopcast_av::Error::FileNotFound { path }),
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(loopcast_av::Error::FileNotFound { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn check_available(&self) -> loopcast_av::Result<()> {
        check_path(&self.dir)
    }

    fn mark_packaged(&self) {
        self.packaged.store(true, Ordering::Release);
    }
}

fn check_path(path: &Path) -> loopcast_av::Result<()> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(loopcast_av::Error::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}
