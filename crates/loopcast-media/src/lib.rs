//! loopcast-media: loop clock arithmetic and live HLS playlists.
//!
//! This crate holds the pure, I/O-free part of loopcast. Everything here is a
//! function of a source duration, a segment duration and an elapsed time, so
//! it can be tested with fixed inputs.
//!
//! # Modules
//!
//! - `clock` - maps elapsed wall-clock time onto a finite source
//! - `timeline` - slices a looped source into segments and builds the live window
//! - `hls` - live media playlist rendering (m3u8)

pub mod clock;
pub mod error;
pub mod hls;
pub mod timeline;

pub use clock::LoopClock;
pub use error::{Error, Result};
pub use hls::{LivePlaylist, LiveWindow, SegmentEntry, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
pub use timeline::{Timeline, WindowEntry};
