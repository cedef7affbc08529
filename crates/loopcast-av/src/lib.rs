//! # loopcast-av
//!
//! External tool invocation for loopcast.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support; children are killed on timeout or when the future is dropped.
//! - **Probing** ([`probe::probe_duration`]) -- measure a source's duration.
//! - **Actions** ([`actions`]) -- one-time packaging to MPEG-TS and
//!   on-demand slicing of the packaged file.
//! - **Workspace management** ([`Workspace`]) -- temporary directory owning
//!   one packaged asset.
//! - **The invoker seam** ([`TranscodeInvoker`], [`FfmpegInvoker`]).

pub mod actions;
pub mod command;
pub mod error;
pub mod invoker;
pub mod options;
pub mod probe;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use invoker::{FfmpegInvoker, InvokerTimeouts, TranscodeInvoker};
pub use options::{validate_source, OutputTarget, TranscodeOptions};
pub use tools::{ToolInfo, ToolPaths, ToolRegistry};
pub use workspace::Workspace;
