use loopcast_av::{InvokerTimeouts, ToolPaths, TranscodeOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::streaming::{ConflictPolicy, PackagingMode, RetentionPolicy, StreamSettings};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub transcode: TranscodeOptions,
}

impl Config {
    /// Session settings derived from the `[stream]`, `[cache]` and
    /// `[transcode]` sections.
    pub fn stream_settings(&self) -> StreamSettings {
        let segment_duration = Duration::from_secs_f64(self.stream.segment_duration_secs);
        let refresh_interval = self
            .stream
            .refresh_interval_secs
            .map(Duration::from_secs_f64)
            .unwrap_or(segment_duration);

        StreamSettings {
            mode: self.stream.mode,
            segment_duration,
            window_size: self.stream.window_size,
            refresh_interval,
            start_timeout: Duration::from_secs(self.stream.start_timeout_secs),
            conflict_policy: self.stream.conflict_policy,
            work_dir: self.stream.work_dir(),
            retention: self.cache.retention(),
            memory_high_water: self.cache.memory_high_water_mb.map(|mb| mb * 1024 * 1024),
            transcode: self.transcode.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL advertised in `manifest_url`, e.g. `https://tv.example.com`.
    /// Derived from the request's `Host` header when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub mode: PackagingMode,

    /// Target segment duration in seconds
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: f64,

    /// Entries in the sliding window (2-15)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Manifest refresh interval in seconds (default: segment duration)
    #[serde(default)]
    pub refresh_interval_secs: Option<f64>,

    /// How long a start request waits for packaging
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Parent directory of packaged assets (default: system temp dir)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_segment_duration() -> f64 {
    5.0
}
fn default_window_size() -> usize {
    3
}
fn default_start_timeout() -> u64 {
    60
}

impl StreamConfig {
    pub fn work_dir(&self) -> PathBuf {
        match &self.work_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).as_ref()),
            None => std::env::temp_dir().join("loopcast"),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            mode: PackagingMode::default(),
            segment_duration_secs: default_segment_duration(),
            window_size: default_window_size(),
            refresh_interval_secs: None,
            start_timeout_secs: default_start_timeout(),
            conflict_policy: ConflictPolicy::default(),
            work_dir: None,
        }
    }
}

/// Which retention policy the segment cache uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    #[default]
    Lru,
    MaxAge,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub policy: CachePolicy,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Only used by the `max_age` policy
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Clear the cache when resident memory exceeds this many MiB
    #[serde(default)]
    pub memory_high_water_mb: Option<u64>,
}

fn default_max_entries() -> usize {
    64
}
fn default_max_age() -> u64 {
    120
}

impl CacheConfig {
    pub fn retention(&self) -> RetentionPolicy {
        match self.policy {
            CachePolicy::Lru => RetentionPolicy::Lru {
                max_entries: self.max_entries,
            },
            CachePolicy::MaxAge => RetentionPolicy::MaxAge {
                max_age: Duration::from_secs(self.max_age_secs),
                max_entries: self.max_entries,
            },
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            max_entries: default_max_entries(),
            max_age_secs: default_max_age(),
            memory_high_water_mb: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_transcode_timeout")]
    pub transcode_timeout_secs: u64,

    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,
}

fn default_probe_timeout() -> u64 {
    30
}
fn default_transcode_timeout() -> u64 {
    3600
}
fn default_extract_timeout() -> u64 {
    20
}

impl ToolsConfig {
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            ffmpeg: self.ffmpeg_path.clone(),
            ffprobe: self.ffprobe_path.clone(),
        }
    }

    pub fn timeouts(&self) -> InvokerTimeouts {
        InvokerTimeouts {
            probe: Duration::from_secs(self.probe_timeout_secs),
            transcode: Duration::from_secs(self.transcode_timeout_secs),
            extract: Duration::from_secs(self.extract_timeout_secs),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: default_probe_timeout(),
            transcode_timeout_secs: default_transcode_timeout(),
            extract_timeout_secs: default_extract_timeout(),
        }
    }
}
