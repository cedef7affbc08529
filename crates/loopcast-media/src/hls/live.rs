//! Sliding window over a looped timeline.

use std::time::Duration;

use super::playlist::{LivePlaylist, SegmentEntry};
use crate::error::{Error, Result};
use crate::timeline::{Timeline, WindowEntry};

/// Smallest accepted window.
pub const MIN_WINDOW_SIZE: usize = 2;
/// Largest accepted window.
pub const MAX_WINDOW_SIZE: usize = 15;

/// Renders the live playlist for any point in time.
///
/// The output depends only on the arguments of [`LiveWindow::playlist`], so
/// the same `elapsed` and `media_sequence` always produce the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveWindow {
    timeline: Timeline,
    size: usize,
}

impl LiveWindow {
    pub fn new(timeline: Timeline, size: usize) -> Result<Self> {
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&size) {
            return Err(Error::InvalidWindowSize {
                size,
                min: MIN_WINDOW_SIZE,
                max: MAX_WINDOW_SIZE,
            });
        }
        Ok(Self { timeline, size })
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `#EXT-X-TARGETDURATION` for this timeline.
    pub fn target_duration(&self) -> u32 {
        self.timeline.segment_duration().as_secs_f64().ceil() as u32
    }

    /// Entries on air after `elapsed` time.
    pub fn entries(&self, elapsed: Duration) -> Vec<WindowEntry> {
        self.timeline.window(elapsed, self.size)
    }

    /// Build the playlist for `elapsed` time, naming each segment with `uri`.
    pub fn playlist<F>(&self, elapsed: Duration, media_sequence: u64, uri: F) -> LivePlaylist
    where
        F: Fn(&WindowEntry) -> String,
    {
        let entries = self.entries(elapsed);

        let mut playlist = LivePlaylist::new(self.target_duration());
        playlist.media_sequence = media_sequence;
        playlist.discontinuity_sequence = entries.first().map(|e| e.loop_index).unwrap_or(0);
        playlist.segments = entries
            .iter()
            .map(|entry| SegmentEntry {
                duration: entry.duration.as_secs_f64(),
                uri: uri(entry),
                title: None,
                discontinuity: entry.discontinuity,
            })
            .collect();

        playlist
    }
}
