//! Typed packaging options and output targets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name pattern of pre-split segments, in ffmpeg's printf syntax.
pub const SEGMENT_PATTERN: &str = "seg%05d.ts";

/// Codec settings for the one-time packaging run.
///
/// `"copy"` keeps the source stream as is; anything else is passed to ffmpeg
/// as an encoder name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    pub video_codec: String,
    pub audio_codec: String,
    /// e.g. `"2500k"`; ignored for stream copy.
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    /// Video bitstream filter applied when copying the stream.
    pub bitstream_filter: Option<String>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            video_codec: "copy".to_string(),
            audio_codec: "copy".to_string(),
            video_bitrate: None,
            audio_bitrate: None,
            bitstream_filter: Some("h264_mp4toannexb".to_string()),
        }
    }
}

impl TranscodeOptions {
    pub fn copies_video(&self) -> bool {
        self.video_codec == "copy"
    }

    pub fn copies_audio(&self) -> bool {
        self.audio_codec == "copy"
    }

    /// Reject values that ffmpeg could read as options of their own.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("video_codec", Some(self.video_codec.as_str())),
            ("audio_codec", Some(self.audio_codec.as_str())),
            ("video_bitrate", self.video_bitrate.as_deref()),
            ("audio_bitrate", self.audio_bitrate.as_deref()),
            ("bitstream_filter", self.bitstream_filter.as_deref()),
        ];

        for (name, value) in fields {
            let Some(value) = value else { continue };
            let valid = !value.is_empty()
                && value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '='))
                && !value.starts_with('-');
            if !valid {
                return Err(Error::invalid_input(format!("{name} has an invalid value: {value:?}")));
            }
        }

        Ok(())
    }
}

/// Check a source locator before it is handed to an external tool.
pub fn validate_source(source: &str) -> Result<()> {
    if source.trim().is_empty() {
        return Err(Error::invalid_input("source locator is empty"));
    }
    if source.starts_with('-') {
        return Err(Error::invalid_input(
            "source locator must not start with '-'",
        ));
    }
    if source.chars().any(char::is_control) {
        return Err(Error::invalid_input(
            "source locator contains control characters",
        ));
    }
    Ok(())
}

/// Where the packaging run writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One MPEG-TS file, sliced on demand later.
    File(PathBuf),
    /// Numbered MPEG-TS files of `segment_duration` each.
    Segments {
        dir: PathBuf,
        segment_duration: Duration,
    },
}

impl OutputTarget {
    /// Path of the pre-split segment with the given index.
    pub fn segment_path(dir: &Path, index: u64) -> PathBuf {
        dir.join(format!("seg{index:05}.ts"))
    }

    /// Whether enough output exists to start serving.
    pub fn is_ready(&self) -> bool {
        let probe = match self {
            Self::File(path) => path.clone(),
            Self::Segments { dir, .. } => Self::segment_path(dir, 0),
        };
        std::fs::metadata(probe)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}
