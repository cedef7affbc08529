//! Segment layout of a looped source.
//!
//! A [`Timeline`] cuts the source into slices of the target segment duration
//! and lays them end to end forever. Slice start offsets are kept at whole
//! milliseconds so they can be used directly as cache keys.
//!
//! Two layouts exist:
//!
//! - **continuous**: a slice may start at any millisecond. Used when slices
//!   are cut on demand from one packaged file.
//! - **aligned**: slices start on multiples of the segment duration. Used
//!   when the packager already split the source into numbered files.

use std::time::Duration;

use crate::clock::LoopClock;
use crate::error::{Error, Result};

/// One entry of the live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Offset of the slice within the source.
    pub start: Duration,
    /// Playable length of the slice.
    pub duration: Duration,
    /// The bytes before this slice are not contiguous with it.
    pub discontinuity: bool,
    /// Loop iteration this slice belongs to.
    pub loop_index: u64,
}

/// Slicing rules for one looped source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    clock: LoopClock,
    segment: Duration,
    aligned: bool,
}

impl Timeline {
    /// Create a timeline.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSegmentDuration`] if `segment` is under one millisecond.
    /// - [`Error::ZeroDuration`] / [`Error::SourceTooShort`] from the loop clock.
    pub fn new(source_duration: Duration, segment: Duration, aligned: bool) -> Result<Self> {
        let segment = truncate_ms(segment);
        if segment.is_zero() {
            return Err(Error::InvalidSegmentDuration(segment));
        }
        let clock = LoopClock::for_source(source_duration, segment)?;
        Ok(Self {
            clock,
            segment,
            aligned,
        })
    }

    pub fn clock(&self) -> &LoopClock {
        &self.clock
    }

    pub fn source_duration(&self) -> Duration {
        self.clock.cycle()
    }

    pub fn segment_duration(&self) -> Duration {
        self.segment
    }

    /// Start of the slice playing at `offset`.
    pub fn slice_start(&self, offset: Duration) -> Duration {
        if self.aligned {
            let seg = self.segment.as_millis();
            Duration::from_millis(((offset.as_millis() / seg) * seg) as u64)
        } else {
            truncate_ms(offset)
        }
    }

    /// Length of the slice starting at `start`, shortened at the end of the source.
    pub fn slice_len(&self, start: Duration) -> Duration {
        self.segment
            .min(self.source_duration().saturating_sub(start))
    }

    /// Whether a slice may start at `start`.
    pub fn is_valid_start(&self, start: Duration) -> bool {
        if start >= self.source_duration() || truncate_ms(start) != start {
            return false;
        }
        !self.aligned || start.as_millis() % self.segment.as_millis() == 0
    }

    /// Build `size` consecutive slices starting with the one playing after
    /// `elapsed` time.
    ///
    /// Each slice starts where the previous one ended. A slice that would run
    /// past the end of the source is cut short, and the slice after it starts
    /// over at zero with a discontinuity.
    pub fn window(&self, elapsed: Duration, size: usize) -> Vec<WindowEntry> {
        let end = self.source_duration();
        let mut start = self.slice_start(self.clock.offset_after(elapsed));
        let mut loop_index = self.clock.loops_completed(elapsed);
        let mut discontinuity = false;

        let mut entries = Vec::with_capacity(size);
        for _ in 0..size {
            let duration = self.slice_len(start);
            entries.push(WindowEntry {
                start,
                duration,
                discontinuity,
                loop_index,
            });

            let next = start + duration;
            if next >= end {
                start = Duration::ZERO;
                loop_index += 1;
                discontinuity = true;
            } else {
                start = next;
                discontinuity = false;
            }
        }

        entries
    }
}

fn truncate_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_window_without_wrap() {
        let timeline = Timeline::new(secs(30), secs(5), false).unwrap();
        let window = timeline.window(Duration::ZERO, 3);

        let starts: Vec<_> = window.iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![secs(0), secs(5), secs(10)]);
        assert!(window.iter().all(|e| e.duration == secs(5)));
        assert!(window.iter().all(|e| !e.discontinuity));
    }

    #[test]
    fn test_window_marks_discontinuity_at_wrap() {
        let timeline = Timeline::new(secs(30), secs(5), false).unwrap();
        let window = timeline.window(secs(20), 4);

        let starts: Vec<_> = window.iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![secs(20), secs(25), secs(0), secs(5)]);
        assert!(!window[1].discontinuity);
        assert!(window[2].discontinuity);
        assert!(!window[3].discontinuity);
        assert_eq!(window[0].loop_index, 0);
        assert_eq!(window[2].loop_index, 1);
    }

    #[test]
    fn test_last_slice_is_shortened() {
        let timeline = Timeline::new(Duration::from_millis(12_500), secs(5), false).unwrap();
        let window = timeline.window(secs(10), 2);

        assert_eq!(window[0].start, secs(10));
        assert_eq!(window[0].duration, Duration::from_millis(2_500));
        assert_eq!(window[1].start, Duration::ZERO);
        assert!(window[1].discontinuity);
    }

    #[test]
    fn test_aligned_window_snaps_to_grid() {
        let timeline = Timeline::new(secs(30), secs(5), true).unwrap();
        let window = timeline.window(Duration::from_millis(7_300), 2);

        assert_eq!(window[0].start, secs(5));
        assert_eq!(window[1].start, secs(10));
    }

    #[test]
    fn test_continuous_window_truncates_to_millis() {
        let timeline = Timeline::new(secs(30), secs(5), false).unwrap();
        let window = timeline.window(Duration::from_micros(7_300_900), 1);
        assert_eq!(window[0].start, Duration::from_millis(7_300));
    }

    #[test]
    fn test_valid_start() {
        let continuous = Timeline::new(secs(30), secs(5), false).unwrap();
        assert!(continuous.is_valid_start(Duration::from_millis(7_300)));
        assert!(!continuous.is_valid_start(secs(30)));

        let aligned = Timeline::new(secs(30), secs(5), true).unwrap();
        assert!(aligned.is_valid_start(secs(25)));
        assert!(!aligned.is_valid_start(Duration::from_millis(7_300)));
    }

    #[test]
    fn test_rejects_short_source() {
        assert!(matches!(
            Timeline::new(secs(4), secs(5), false),
            Err(Error::SourceTooShort { .. })
        ));
        assert!(matches!(
            Timeline::new(secs(4), Duration::from_micros(10), false),
            Err(Error::InvalidSegmentDuration(_))
        ));
    }
}
