//! Live media playlist structure.

use std::fmt;

/// HLS protocol version written to the header.
const PROTOCOL_VERSION: u8 = 3;

/// A sliding-window media playlist.
///
/// Rendering never emits `#EXT-X-ENDLIST`: a live playlist is expected to be
/// re-fetched and to keep moving forward.
#[derive(Debug, Clone, PartialEq)]
pub struct LivePlaylist {
    /// Target duration in whole seconds.
    pub target_duration: u32,
    /// Media sequence number of the first entry.
    pub media_sequence: u64,
    /// Discontinuity sequence number of the first entry.
    pub discontinuity_sequence: u64,
    /// Whether clients may cache segments.
    pub allow_cache: bool,
    /// Segment entries.
    pub segments: Vec<SegmentEntry>,
}

impl LivePlaylist {
    /// Create an empty live playlist.
    pub fn new(target_duration: u32) -> Self {
        Self {
            target_duration,
            media_sequence: 0,
            discontinuity_sequence: 0,
            allow_cache: false,
            segments: Vec::new(),
        }
    }

    /// Render to M3U8 string.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LivePlaylist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:{PROTOCOL_VERSION}")?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence)?;
        if self.discontinuity_sequence > 0 {
            writeln!(
                f,
                "#EXT-X-DISCONTINUITY-SEQUENCE:{}",
                self.discontinuity_sequence
            )?;
        }
        writeln!(
            f,
            "#EXT-X-ALLOW-CACHE:{}",
            if self.allow_cache { "YES" } else { "NO" }
        )?;

        for segment in &self.segments {
            if segment.discontinuity {
                writeln!(f, "#EXT-X-DISCONTINUITY")?;
            }
            match segment.title {
                Some(ref title) => writeln!(f, "#EXTINF:{:.3},{}", segment.duration, title)?,
                None => writeln!(f, "#EXTINF:{:.3},", segment.duration)?,
            }
            writeln!(f, "{}", segment.uri)?;
        }

        Ok(())
    }
}

/// A segment entry in the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    /// Duration in seconds.
    pub duration: f64,
    /// Segment URI.
    pub uri: String,
    /// Optional title.
    pub title: Option<String>,
    /// Discontinuity before this segment.
    pub discontinuity: bool,
}
