//! Loop clock.
//!
//! A finite source of length `D` is presented as if it never ended: the
//! position that is "now" is the time elapsed since the session started,
//! taken modulo `D`. All arithmetic is done in integer nanoseconds so that
//! repeated ticks never accumulate floating point drift.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Maps elapsed time onto a looping source of fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopClock {
    cycle: Duration,
}

impl LoopClock {
    /// Create a clock that wraps every `cycle`.
    pub fn new(cycle: Duration) -> Result<Self> {
        if cycle.is_zero() {
            return Err(Error::ZeroDuration);
        }
        Ok(Self { cycle })
    }

    /// Create a clock for a source that must hold at least one segment.
    ///
    /// Sources shorter than `segment` are rejected rather than producing a
    /// degenerate loop.
    pub fn for_source(duration: Duration, segment: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(Error::ZeroDuration);
        }
        if duration < segment {
            return Err(Error::SourceTooShort { duration, segment });
        }
        Self::new(duration)
    }

    /// Length of one loop.
    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Position within the source after `elapsed` time. Always `< cycle`.
    pub fn offset_after(&self, elapsed: Duration) -> Duration {
        from_nanos(elapsed.as_nanos() % self.cycle.as_nanos())
    }

    /// Position within the source at `now` for a session that began at
    /// `started_at`. An instant before the start maps to offset zero.
    pub fn current_offset(&self, started_at: Instant, now: Instant) -> Duration {
        self.offset_after(now.saturating_duration_since(started_at))
    }

    /// Number of full loops played after `elapsed` time.
    pub fn loops_completed(&self, elapsed: Duration) -> u64 {
        u64::try_from(elapsed.as_nanos() / self.cycle.as_nanos()).unwrap_or(u64::MAX)
    }
}

fn from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}
