//! On-demand slicing of a packaged asset.
//!
//! A slice is cut by seeking inside the already packaged file and copying a
//! bounded duration, so the cost is proportional to the slice length rather
//! than to the whole asset. Timestamps are kept from the asset so that
//! consecutive slices play back to back.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;

use super::package::format_secs;
use crate::command::ToolCommand;
use crate::error::{Error, Result};

/// Build the ffmpeg arguments that write `[start, start + length)` of `asset`
/// to stdout as MPEG-TS.
pub fn slice_args(asset: &Path, start: Duration, length: Duration) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-nostats", "-v", "error"]
        .into_iter()
        .map(String::from)
        .collect();

    args.extend(["-ss".to_string(), format_secs(start)]);
    args.extend(["-i".to_string(), asset.to_string_lossy().to_string()]);
    args.extend(["-t".to_string(), format_secs(length)]);
    args.extend(
        ["-map", "0", "-c", "copy", "-copyts", "-muxdelay", "0", "-f", "mpegts", "pipe:1"]
            .into_iter()
            .map(String::from),
    );

    args
}

/// Cut one slice out of `asset`.
pub async fn slice(
    ffmpeg: &Path,
    timeout: Duration,
    asset: &Path,
    start: Duration,
    length: Duration,
) -> Result<Bytes> {
    if !asset.is_file() {
        return Err(Error::FileNotFound {
            path: asset.to_path_buf(),
        });
    }
    if length.is_zero() {
        return Err(Error::invalid_input("slice length is zero"));
    }

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(timeout);
    cmd.args(slice_args(asset, start, length));
    let output = cmd.execute().await?;

    if output.stdout.is_empty() {
        return Err(Error::tool_failed(
            "ffmpeg",
            format!("empty slice at {:?} from {}", start, asset.display()),
        ));
    }

    tracing::debug!(
        start_ms = start.as_millis() as u64,
        length_ms = length.as_millis() as u64,
        bytes = output.stdout.len(),
        "Extracted slice"
    );

    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn seek_precedes_input() {
        let args = slice_args(
            Path::new("/work/asset.ts"),
            Duration::from_millis(12_500),
            Duration::from_secs(5),
        );
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "12.500");
        assert_eq!(args[input + 1], "/work/asset.ts");
        assert!(args.contains(&"-copyts".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[tokio::test]
    async fn missing_asset_is_reported() {
        let err = slice(
            Path::new("ffmpeg"),
            Duration::from_secs(1),
            &PathBuf::from("/nonexistent/asset.ts"),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.is_missing_file());
    }
}
