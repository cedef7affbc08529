//! Segment bytes and the current manifest of one session.
//!
//! Slices are cached in memory under their [`SegmentKey`]. A miss triggers a
//! fetch from the session's [`SegmentSource`]; concurrent requests for the
//! same key wait on the first one instead of starting their own extraction.
//!
//! Retention is either least-recently-used with an entry bound, or an age
//! limit swept on every refresh tick (also entry-bounded). Independently of
//! either policy, the store drops everything when the process crosses the
//! configured memory high-water mark.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::error::{Error, Result};
use super::key::SegmentKey;
use super::manifest::Manifest;
use super::memory::MemoryGauge;
use super::source::SegmentSource;

/// How long cached slices are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep at most `max_entries`, dropping the least recently used.
    Lru { max_entries: usize },
    /// Drop slices produced more than `max_age` ago. `max_entries` still caps
    /// the store between sweeps.
    MaxAge {
        max_age: Duration,
        max_entries: usize,
    },
}

impl RetentionPolicy {
    pub fn max_entries(&self) -> usize {
        match self {
            Self::Lru { max_entries } | Self::MaxAge { max_entries, .. } => *max_entries,
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        match self {
            Self::Lru { .. } => None,
            Self::MaxAge { max_age, .. } => Some(*max_age),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Lru { max_entries: 64 }
    }
}

struct CachedSegment {
    bytes: Bytes,
    produced_at: Instant,
}

/// Counters reported in the session status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub extractions: u64,
    pub pressure_clears: u64,
}

/// Removes the in-flight marker and wakes waiters, also when the loading
/// future is dropped half way.
struct LoadGuard<'a> {
    loading: &'a DashMap<SegmentKey, Arc<Notify>>,
    key: SegmentKey,
    notify: Arc<Notify>,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.loading.remove(&self.key);
        self.notify.notify_waiters();
    }
}

pub struct SegmentStore {
    segments: Mutex<LruCache<SegmentKey, CachedSegment>>,
    loading: DashMap<SegmentKey, Arc<Notify>>,
    source: Arc<dyn SegmentSource>,
    retention: RetentionPolicy,
    memory: Arc<dyn MemoryGauge>,
    high_water: Option<u64>,
    manifest: RwLock<Option<Arc<Manifest>>>,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    extractions: AtomicU64,
    pressure_clears: AtomicU64,
}

impl SegmentStore {
    pub fn new(
        source: Arc<dyn SegmentSource>,
        retention: RetentionPolicy,
        memory: Arc<dyn MemoryGauge>,
        high_water: Option<u64>,
    ) -> Self {
        Self {
            segments: Mutex::new(LruCache::unbounded()),
            loading: DashMap::new(),
            source,
            retention,
            memory,
            high_water,
            manifest: RwLock::new(None),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            extractions: AtomicU64::new(0),
            pressure_clears: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &Arc<dyn SegmentSource> {
        &self.source
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Cached bytes for `key`. Marks the entry as recently used.
    ///
    /// An entry past the age limit counts as absent and is dropped.
    pub fn get(&self, key: &SegmentKey) -> Option<Bytes> {
        let mut segments = self.segments.lock();
        let expired = match (segments.get(key), self.retention.max_age()) {
            (None, _) => return None,
            (Some(cached), Some(max_age)) => cached.produced_at.elapsed() >= max_age,
            (Some(_), None) => false,
        };
        if expired {
            segments.pop(key);
            return None;
        }
        segments.get(key).map(|cached| cached.bytes.clone())
    }

    /// Insert `bytes` under `key`, then enforce capacity and memory limits.
    ///
    /// Ignored once the store is closed, so extractions that outlive their
    /// session do not repopulate it.
    pub fn put(&self, key: SegmentKey, bytes: Bytes) {
        if self.is_closed() {
            tracing::trace!(%key, "Store closed, dropping extracted segment");
            return;
        }
        self.segments.lock().put(
            key,
            CachedSegment {
                bytes,
                produced_at: Instant::now(),
            },
        );
        self.evict_if_over_capacity();
        self.check_memory_pressure();
    }

    /// Drop least recently used entries until the entry bound holds.
    /// Returns how many were dropped.
    pub fn evict_if_over_capacity(&self) -> usize {
        let max_entries = self.retention.max_entries();
        let mut segments = self.segments.lock();
        let mut evicted = 0;
        while segments.len() > max_entries {
            match segments.pop_lru() {
                Some((key, _)) => {
                    tracing::trace!(%key, "Evicted segment");
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    /// Drop entries produced more than `age` ago. Returns how many were dropped.
    pub fn purge_older_than(&self, age: Duration) -> usize {
        let now = Instant::now();
        let mut segments = self.segments.lock();
        let stale: Vec<SegmentKey> = segments
            .iter()
            .filter(|(_, cached)| now.saturating_duration_since(cached.produced_at) >= age)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            segments.pop(key);
        }
        stale.len()
    }

    /// Apply the configured retention policy.
    pub fn sweep(&self) {
        if let Some(max_age) = self.retention.max_age() {
            let purged = self.purge_older_than(max_age);
            if purged > 0 {
                tracing::debug!(purged, "Purged aged segments");
            }
        }
        self.evict_if_over_capacity();
    }

    /// Clear the cache if the process is above the high-water mark.
    /// Returns whether it did.
    pub fn check_memory_pressure(&self) -> bool {
        let Some(high_water) = self.high_water else {
            return false;
        };
        let Some(resident) = self.memory.resident_bytes() else {
            return false;
        };
        if resident <= high_water {
            return false;
        }

        let dropped = {
            let mut segments = self.segments.lock();
            let len = segments.len();
            segments.clear();
            len
        };
        self.pressure_clears.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            resident,
            high_water,
            dropped,
            "Memory above high-water mark, cleared segment cache"
        );
        true
    }

    /// Bytes for `key`, extracting them on a miss.
    ///
    /// At most one fetch per key is in flight. Callers arriving while it runs
    /// wait for its outcome; if it failed, one of them retries. A failed fetch
    /// leaves no entry behind.
    pub async fn get_or_extract(&self, key: SegmentKey, length: Duration) -> Result<Bytes> {
        if let Some(bytes) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(bytes);
        }

        loop {
            match self.loading.entry(key) {
                Entry::Occupied(e) => {
                    let notify = e.get().clone();
                    // Registered before the shard lock is released, so the
                    // loader's wake-up can not slip in between.
                    let notified = notify.notified();
                    drop(e);
                    notified.await;

                    if let Some(bytes) = self.get(&key) {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(bytes);
                    }
                }
                Entry::Vacant(e) => {
                    let notify = Arc::new(Notify::new());
                    e.insert(notify.clone());
                    let _guard = LoadGuard {
                        loading: &self.loading,
                        key,
                        notify,
                    };

                    // Another loader may have finished between our first
                    // lookup and taking the slot.
                    if let Some(bytes) = self.get(&key) {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(bytes);
                    }

                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.extractions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%key, length_ms = length.as_millis() as u64, "Extracting segment");

                    let bytes = self
                        .source
                        .fetch(key.start(), length)
                        .await
                        .map_err(|source| Error::Extract {
                            key: key.to_string(),
                            source,
                        })?;

                    self.put(key, bytes.clone());
                    return Ok(bytes);
                }
            }
        }
    }

    /// Drop every cached slice.
    pub fn clear(&self) {
        self.segments.lock().clear();
    }

    /// Drop everything and refuse further inserts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
        self.clear_manifest();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn publish_manifest(&self, manifest: Manifest) {
        *self.manifest.write() = Some(Arc::new(manifest));
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().clone()
    }

    pub fn clear_manifest(&self) {
        *self.manifest.write() = None;
    }

    pub fn len(&self) -> usize {
        self.segments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &SegmentKey) -> bool {
        self.segments.lock().contains(key)
    }

    pub fn stats(&self) -> StoreStats {
        let (entries, bytes) = {
            let segments = self.segments.lock();
            let bytes = segments.iter().map(|(_, c)| c.bytes.len() as u64).sum();
            (segments.len(), bytes)
        };
        StoreStats {
            entries,
            bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
            pressure_clears: self.pressure_clears.load(Ordering::Relaxed),
        }
    }
}
