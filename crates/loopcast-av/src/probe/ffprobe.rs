//! Duration probing through the `ffprobe` CLI.
//!
//! Runs `ffprobe -v error -print_format json -show_format <source>` and reads
//! `format.duration`. A source without a usable duration is an error: a
//! looped presentation can not be built on top of it.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::error::{Error, Result};

/// Measure the playable duration of `source`.
pub async fn probe_duration(ffprobe: &Path, timeout: Duration, source: &str) -> Result<Duration> {
    let mut cmd = ToolCommand::new(ffprobe.to_path_buf());
    cmd.timeout(timeout);
    cmd.args(["-v", "error", "-print_format", "json", "-show_format"]);
    cmd.arg(source);

    let output = cmd.execute().await?;
    let duration = parse_duration(&output.stdout_lossy())?;

    tracing::debug!(source, duration_secs = duration.as_secs_f64(), "Probed source duration");
    Ok(duration)
}

/// Extract `format.duration` from ffprobe JSON output.
pub fn parse_duration(json: &str) -> Result<Duration> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::parse_error("ffprobe", format!("JSON parse error: {e}")))?;

    let raw = output
        .format
        .duration
        .ok_or_else(|| Error::parse_error("ffprobe", "no duration reported"))?;

    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::parse_error("ffprobe", format!("invalid duration: {raw:?}")))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(Error::parse_error(
            "ffprobe",
            format!("unusable duration: {raw}"),
        ));
    }

    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::parse_error("ffprobe", format!("duration out of range: {e}")))
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}
