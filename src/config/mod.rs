mod types;

pub use types::*;

use anyhow::{Context, Result};
use loopcast_media::{MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./loopcast.toml",
        "./config.toml",
        "~/.config/loopcast/config.toml",
        "/etc/loopcast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if let Some(url) = &config.server.public_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("server.public_url must start with http:// or https://");
        }
    }

    let stream = &config.stream;
    let segment = stream.segment_duration_secs;
    if !segment.is_finite() || segment < 0.5 {
        anyhow::bail!("stream.segment_duration_secs must be at least 0.5, got {segment}");
    }
    if segment > 30.0 {
        tracing::warn!("Segment duration of {segment}s is unusually long for live HLS");
    }

    if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&stream.window_size) {
        anyhow::bail!(
            "stream.window_size must be between {MIN_WINDOW_SIZE} and {MAX_WINDOW_SIZE}, got {}",
            stream.window_size
        );
    }

    if let Some(interval) = stream.refresh_interval_secs {
        if !interval.is_finite() || interval < segment * 0.5 || interval > segment * 2.0 {
            anyhow::bail!(
                "stream.refresh_interval_secs must be between {} and {}, got {interval}",
                segment * 0.5,
                segment * 2.0
            );
        }
        if interval != segment {
            tracing::warn!(
                "Refresh interval {interval}s differs from segment duration {segment}s; \
                 the window will not advance by whole segments"
            );
        }
    }

    if stream.start_timeout_secs == 0 {
        anyhow::bail!("stream.start_timeout_secs cannot be 0");
    }

    if config.cache.max_entries < stream.window_size {
        anyhow::bail!(
            "cache.max_entries ({}) must hold at least one window ({})",
            config.cache.max_entries,
            stream.window_size
        );
    }
    if config.cache.policy == CachePolicy::MaxAge && config.cache.max_age_secs == 0 {
        anyhow::bail!("cache.max_age_secs cannot be 0 with the max_age policy");
    }
    if config.cache.memory_high_water_mb == Some(0) {
        anyhow::bail!("cache.memory_high_water_mb cannot be 0");
    }

    for (name, path) in [
        ("ffmpeg", &config.tools.ffmpeg_path),
        ("ffprobe", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured {} path does not exist: {:?}", name, path);
            }
        }
    }

    if config.tools.extract_timeout_secs == 0
        || config.tools.probe_timeout_secs == 0
        || config.tools.transcode_timeout_secs == 0
    {
        anyhow::bail!("Tool timeouts cannot be 0");
    }

    config
        .transcode
        .validate()
        .context("Invalid [transcode] section")?;

    Ok(())
}
