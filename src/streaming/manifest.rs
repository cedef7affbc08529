//! Manifest rendering for a running session.

use tokio::time::Instant;

use loopcast_media::LiveWindow;

use super::key::SegmentKey;

/// A rendered playlist, as served to players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Session generation the segment URIs belong to.
    pub generation: u64,
    /// `#EXT-X-MEDIA-SEQUENCE` of this rendering.
    pub sequence: u64,
    pub body: String,
}

/// Everything needed to render the manifest at some instant.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub window: LiveWindow,
    pub started_at: Instant,
    pub sequence: u64,
}

/// Render the playlist a player should see at `now`.
pub fn render(snapshot: &SessionSnapshot, now: Instant) -> Manifest {
    let elapsed = now.saturating_duration_since(snapshot.started_at);
    let generation = snapshot.generation;

    let body = snapshot
        .window
        .playlist(elapsed, snapshot.sequence, |entry| {
            SegmentKey::new(generation, entry.start).uri()
        })
        .render();

    Manifest {
        generation,
        sequence: snapshot.sequence,
        body,
    }
}
