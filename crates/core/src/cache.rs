//! Range-addressable freshness cache over remote reads.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// One cached byte range of one remote file.
#[derive(Clone, Debug)]
struct CacheEntry {
    bytes: Vec<u8>,
    covered_offset: u64,
    fetched_at: Instant,
    server_modified_ms: i64,
}

impl CacheEntry {
    fn covers(&self, offset: u64, length: u64) -> bool {
        offset >= self.covered_offset
            && offset.saturating_add(length) <= self.covered_offset + self.bytes.len() as u64
    }

    fn fresh_at(&self, now: Instant, freshness: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < freshness
    }
}

/// Per-path cache of the most recent read range.
///
/// A read is answered locally iff it lies inside the entry's covered range
/// and the entry is younger than the freshness interval. On a miss the
/// caller performs the remote read and hands the reply back through
/// [`ClientCache::reconcile`], which compares modification times: an equal
/// time revalidates the entry in place (the file did not change), a
/// different time replaces it.
#[derive(Debug)]
pub struct ClientCache {
    entries: FxHashMap<String, CacheEntry>,
    freshness: Duration,
}

impl ClientCache {
    /// Creates an empty cache with the given freshness interval.
    #[must_use]
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: FxHashMap::default(),
            freshness,
        }
    }

    /// Answers a read locally when covered and fresh at `now`.
    #[must_use]
    pub fn lookup(&self, path: &str, offset: u64, length: u64, now: Instant) -> Option<Vec<u8>> {
        let entry = self.entries.get(path)?;
        if !entry.covers(offset, length) {
            trace!(path, offset, length, "cache miss: range not covered");
            return None;
        }
        if !entry.fresh_at(now, self.freshness) {
            trace!(path, "cache miss: entry stale");
            return None;
        }
        let start = (offset - entry.covered_offset) as usize;
        let end = start + length as usize;
        debug!(path, offset, length, "cache hit");
        Some(entry.bytes[start..end].to_vec())
    }

    /// Modification time recorded for `path`, if an entry exists.
    #[must_use]
    pub fn server_modified_ms(&self, path: &str) -> Option<i64> {
        self.entries
            .get(path)
            .map(|entry| entry.server_modified_ms)
    }

    /// Folds a reply for `[offset, offset + bytes.len())` into the cache.
    ///
    /// Three-way reconciliation against the reply's modification time:
    /// no entry stores the bytes; an entry with the same time is
    /// revalidated in place, keeping its payload; a differing time evicts
    /// and stores the reply.
    pub fn reconcile(
        &mut self,
        path: &str,
        offset: u64,
        bytes: &[u8],
        server_modified_ms: i64,
        now: Instant,
    ) {
        match self.entries.get_mut(path) {
            Some(entry) if entry.server_modified_ms == server_modified_ms => {
                debug!(path, "cache revalidated: server copy unchanged");
                entry.fetched_at = now;
            }
            Some(entry) => {
                debug!(
                    path,
                    cached_ms = entry.server_modified_ms,
                    reply_ms = server_modified_ms,
                    "cache entry replaced: server copy changed"
                );
                *entry = CacheEntry {
                    bytes: bytes.to_vec(),
                    covered_offset: offset,
                    fetched_at: now,
                    server_modified_ms,
                };
            }
            None => {
                debug!(path, offset, len = bytes.len(), "cache entry stored");
                self.entries.insert(
                    path.to_string(),
                    CacheEntry {
                        bytes: bytes.to_vec(),
                        covered_offset: offset,
                        fetched_at: now,
                        server_modified_ms,
                    },
                );
            }
        }
    }

    /// Drops the entry for `path`, if any.
    pub fn invalidate(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            debug!(path, "cache entry invalidated");
        }
    }

    /// Number of cached paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRESH: Duration = Duration::from_millis(5000);

    fn populated(now: Instant) -> ClientCache {
        let mut cache = ClientCache::new(FRESH);
        cache.reconcile("/f", 0, &seq(0, 100), 1000, now);
        cache
    }

    fn seq(start: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| start.wrapping_add(i as u8)).collect()
    }

    #[test]
    fn covered_fresh_reads_are_served_locally() {
        let now = Instant::now();
        let cache = populated(now);
        let bytes = cache.lookup("/f", 10, 20, now).expect("cache hit");
        assert_eq!(bytes, seq(10, 20));
    }

    #[test]
    fn the_whole_covered_range_is_a_hit_at_its_edges() {
        let now = Instant::now();
        let cache = populated(now);
        assert!(cache.lookup("/f", 0, 100, now).is_some());
        assert!(cache.lookup("/f", 99, 1, now).is_some());
        assert!(cache.lookup("/f", 0, 0, now).is_some());
    }

    #[test]
    fn ranges_escaping_the_covered_window_miss() {
        let now = Instant::now();
        let cache = populated(now);
        assert!(cache.lookup("/f", 90, 20, now).is_none());
        assert!(cache.lookup("/f", 100, 1, now).is_none());
        assert!(cache.lookup("/other", 0, 1, now).is_none());
    }

    #[test]
    fn a_nonzero_covered_offset_is_respected() {
        let now = Instant::now();
        let mut cache = ClientCache::new(FRESH);
        cache.reconcile("/f", 50, &seq(50, 30), 1000, now);
        assert_eq!(cache.lookup("/f", 60, 5, now), Some(seq(60, 5)));
        assert!(cache.lookup("/f", 40, 5, now).is_none());
    }

    #[test]
    fn stale_entries_miss_until_revalidated() {
        let fetched = Instant::now();
        let cache = populated(fetched);
        let later = fetched + FRESH + Duration::from_millis(1);
        assert!(cache.lookup("/f", 10, 20, later).is_none());
    }

    #[test]
    fn revalidation_on_equal_mtime_keeps_the_payload_and_refreshes_the_window() {
        let fetched = Instant::now();
        let mut cache = populated(fetched);
        let later = fetched + FRESH + Duration::from_millis(1);

        // Server replies with different bytes but the same modification
        // time; the entry must keep its original payload.
        cache.reconcile("/f", 0, &seq(200, 10), 1000, later);
        assert_eq!(cache.lookup("/f", 10, 20, later), Some(seq(10, 20)));
        assert_eq!(cache.server_modified_ms("/f"), Some(1000));
    }

    #[test]
    fn a_changed_mtime_evicts_and_replaces_the_entry() {
        let fetched = Instant::now();
        let mut cache = populated(fetched);

        cache.reconcile("/f", 5, &seq(200, 10), 2000, fetched);
        assert_eq!(cache.server_modified_ms("/f"), Some(2000));
        assert_eq!(cache.lookup("/f", 5, 10, fetched), Some(seq(200, 10)));
        // The old covered range is gone with the old entry.
        assert!(cache.lookup("/f", 50, 10, fetched).is_none());
    }

    #[test]
    fn reconciled_mtime_always_matches_the_latest_reply() {
        let now = Instant::now();
        let mut cache = ClientCache::new(FRESH);
        cache.reconcile("/f", 0, &seq(0, 10), 1000, now);
        cache.reconcile("/f", 0, &seq(0, 10), 1000, now);
        assert_eq!(cache.server_modified_ms("/f"), Some(1000));
        cache.reconcile("/f", 0, &seq(0, 10), 3000, now);
        assert_eq!(cache.server_modified_ms("/f"), Some(3000));
    }

    #[test]
    fn invalidate_drops_the_path() {
        let now = Instant::now();
        let mut cache = populated(now);
        cache.invalidate("/f");
        assert!(cache.is_empty());
        assert!(cache.lookup("/f", 0, 1, now).is_none());
    }

    #[test]
    fn short_replies_only_cover_what_they_returned() {
        let now = Instant::now();
        let mut cache = ClientCache::new(FRESH);
        // A 20-byte read answered with 5 bytes covers 5 bytes.
        cache.reconcile("/f", 5, &seq(5, 5), 1000, now);
        assert_eq!(cache.lookup("/f", 5, 5, now), Some(seq(5, 5)));
        assert!(cache.lookup("/f", 5, 20, now).is_none());
    }
}
