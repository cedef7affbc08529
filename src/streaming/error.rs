//! Error taxonomy for live sessions.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a session operation can fail with.
///
/// Callers are expected to tell these apart: an [`Error::Extract`] is worth
/// retrying, an [`Error::AlreadyActive`] asks for an explicit stop, and the
/// startup errors mean the source itself is unusable.
#[derive(Debug, Error)]
pub enum Error {
    /// The source duration could not be measured.
    #[error("failed to probe source: {0}")]
    Probe(#[source] loopcast_av::Error),

    /// The measured duration can not be looped (zero, or shorter than one segment).
    #[error("unsupported source duration: {0}")]
    DurationPolicy(#[from] loopcast_media::Error),

    /// Packaging failed, timed out or could not be spawned.
    #[error("transcode failed: {0}")]
    Transcode(#[source] loopcast_av::Error),

    /// An on-demand slice could not be produced. Nothing was cached.
    #[error("segment {key} could not be extracted: {source}")]
    Extract {
        key: String,
        #[source]
        source: loopcast_av::Error,
    },

    /// A session is starting or live and the conflict policy rejects a new one.
    #[error("Please stop the current stream before starting a new one.")]
    AlreadyActive,

    /// Nothing to serve under that name right now.
    #[error("{0} not found")]
    NotFound(String),

    /// The start request carried an unusable source or option.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The packaged asset's workspace could not be created.
    #[error("workspace error: {0}")]
    Workspace(#[source] loopcast_av::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Whether the same request may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Extract { .. })
    }

    /// HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::AlreadyActive => 409,
            Self::Probe(_) | Self::DurationPolicy(_) => 422,
            Self::Transcode(_) => 502,
            Self::Extract { .. } => 503,
            Self::Workspace(_) | Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Probe(_) => "probe_error",
            Self::DurationPolicy(_) => "duration_policy",
            Self::Transcode(_) => "transcode_error",
            Self::Extract { .. } => "extract_error",
            Self::AlreadyActive => "already_active",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Workspace(_) => "workspace_error",
            Self::Internal(_) => "internal_error",
        }
    }
}
