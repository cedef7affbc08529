//! Live HLS playlist generation.
//!
//! This module turns a [`Timeline`](crate::Timeline) window into an M3U8
//! media playlist that never ends.

mod live;
mod playlist;

pub use live::{LiveWindow, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
pub use playlist::{LivePlaylist, SegmentEntry};
