//! Segment keys.
//!
//! A key names a slice by the session generation that produced it and the
//! slice's start offset in the source, in milliseconds: `{generation}-{offset}`.
//! Keys of an earlier session therefore never resolve in a later one.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub generation: u64,
    pub offset_ms: u64,
}

impl SegmentKey {
    pub fn new(generation: u64, start: Duration) -> Self {
        Self {
            generation,
            offset_ms: start.as_millis() as u64,
        }
    }

    /// Start offset of the slice within the source.
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }

    /// URI of this segment as written into the manifest.
    pub fn uri(&self) -> String {
        format!("/segment/{self}.ts")
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.offset_ms)
    }
}

/// Error for a string that is not a segment key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed segment key: {0:?}")]
pub struct ParseKeyError(String);

impl FromStr for SegmentKey {
    type Err = ParseKeyError;

    /// Accepts `{generation}-{offset}` with an optional `.ts` suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_suffix(".ts").unwrap_or(s);
        let (generation, offset) = raw
            .split_once('-')
            .ok_or_else(|| ParseKeyError(s.to_string()))?;

        let generation = parse_digits(generation).ok_or_else(|| ParseKeyError(s.to_string()))?;
        let offset_ms = parse_digits(offset).ok_or_else(|| ParseKeyError(s.to_string()))?;

        Ok(Self {
            generation,
            offset_ms,
        })
    }
}

/// Plain decimal digits only; `u64::from_str` would also take a leading `+`.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
