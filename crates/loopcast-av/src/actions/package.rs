//! One-time packaging of a source into MPEG-TS.

use std::path::Path;
use std::time::Duration;

use crate::command::ToolCommand;
use crate::error::{Error, Result};
use crate::options::{OutputTarget, TranscodeOptions, SEGMENT_PATTERN};

/// Build the ffmpeg arguments that package `source` into `target`.
///
/// - [`OutputTarget::File`]: a single MPEG-TS file.
/// - [`OutputTarget::Segments`]: numbered MPEG-TS files cut by the `segment`
///   muxer. When the video is re-encoded, keyframes are forced on the
///   segment grid so every file starts exactly on a multiple of the segment
///   duration.
pub fn package_args(source: &str, target: &OutputTarget, options: &TranscodeOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-nostats", "-v", "error", "-y"]
        .into_iter()
        .map(String::from)
        .collect();

    args.extend(["-i".to_string(), source.to_string()]);
    args.extend(["-c:v".to_string(), options.video_codec.clone()]);
    args.extend(["-c:a".to_string(), options.audio_codec.clone()]);

    if !options.copies_video() {
        if let Some(ref rate) = options.video_bitrate {
            args.extend(["-b:v".to_string(), rate.clone()]);
        }
    }
    if !options.copies_audio() {
        if let Some(ref rate) = options.audio_bitrate {
            args.extend(["-b:a".to_string(), rate.clone()]);
        }
    }
    if options.copies_video() {
        if let Some(ref bsf) = options.bitstream_filter {
            args.extend(["-bsf:v".to_string(), bsf.clone()]);
        }
    }

    match target {
        OutputTarget::File(path) => {
            args.extend(["-f".to_string(), "mpegts".to_string()]);
            args.push(path.to_string_lossy().to_string());
        }
        OutputTarget::Segments {
            dir,
            segment_duration,
        } => {
            let secs = format_secs(*segment_duration);
            if !options.copies_video() {
                args.extend([
                    "-force_key_frames".to_string(),
                    format!("expr:gte(t,n_forced*{secs})"),
                ]);
            }
            args.extend(["-f".to_string(), "segment".to_string()]);
            args.extend(["-segment_time".to_string(), secs]);
            args.extend(["-segment_format".to_string(), "mpegts".to_string()]);
            args.extend(["-segment_start_number".to_string(), "0".to_string()]);
            args.extend(["-reset_timestamps".to_string(), "0".to_string()]);
            args.push(dir.join(SEGMENT_PATTERN).to_string_lossy().to_string());
        }
    }

    args
}

/// Run the packaging step and wait for it to finish.
pub async fn package(
    ffmpeg: &Path,
    timeout: Duration,
    source: &str,
    target: &OutputTarget,
    options: &TranscodeOptions,
) -> Result<()> {
    options.validate()?;

    if let OutputTarget::Segments { dir, .. } = target {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Workspace(format!(
                "failed to create segment dir {}: {e}",
                dir.display()
            ))
        })?;
    }

    tracing::info!(
        source,
        target = ?target,
        video_codec = %options.video_codec,
        audio_codec = %options.audio_codec,
        "Packaging source"
    );

    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.timeout(timeout);
    cmd.args(package_args(source, target, options));
    cmd.execute().await?;

    tracing::info!(source, "Packaging finished");
    Ok(())
}

pub(crate) fn format_secs(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}
