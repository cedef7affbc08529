//! Source probing.

mod ffprobe;

pub use ffprobe::{parse_duration, probe_duration};
