//! Error types for loopcast-media.

use std::time::Duration;
use thiserror::Error;

/// Result type for loopcast-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for loopcast-media operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The source has no playable length.
    #[error("source duration is zero")]
    ZeroDuration,

    /// The source cannot fill a single segment.
    #[error("source duration {duration:?} is shorter than one segment ({segment:?})")]
    SourceTooShort { duration: Duration, segment: Duration },

    /// Segment duration outside the supported range.
    #[error("invalid segment duration: {0:?}")]
    InvalidSegmentDuration(Duration),

    /// Window size outside the supported range.
    #[error("invalid window size: {size} (expected {min}..={max})")]
    InvalidWindowSize { size: usize, min: usize, max: usize },
}
