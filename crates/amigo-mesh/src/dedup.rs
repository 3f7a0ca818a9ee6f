//! Inbound packet deduplication.
//!
//! A [`TtlBloomFilter`] pairs a bloom filter with a per-fingerprint
//! insertion-time side table. The filter answers the hot-path membership
//! test; the side table lets a prune pass age entries out and rebuild
//! the bits, so a fingerprint becomes visible again after its TTL. A bit
//! may survive a prune if it collided with a live entry — acceptable
//! within the filter's false-positive budget.
//!
//! The whole structure snapshots to JSON on a cadence and reloads on
//! restart, pruning stale entries on load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::{MeshError, Result};

/// Filter statistics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Entries in the side table, live or expired.
    pub total_entries: usize,
    /// Entries within their TTL.
    pub active_entries: usize,
    /// Entries past their TTL awaiting a prune.
    pub expired_entries: usize,
    /// The configured TTL.
    pub ttl_ms: i64,
}

/// JSON snapshot of the filter state.
#[derive(Serialize, Deserialize)]
struct DedupSnapshot {
    ttl_ms: i64,
    capacity: usize,
    false_positive_rate: f64,
    filter: BloomFilter,
    entries: HashMap<String, i64>,
}

/// A time-bounded dedup index over packet fingerprints.
pub struct TtlBloomFilter {
    filter: BloomFilter,
    entries: HashMap<String, i64>,
    ttl_ms: i64,
    capacity: usize,
    false_positive_rate: f64,
}

impl TtlBloomFilter {
    /// Create an empty filter.
    pub fn new(capacity: usize, false_positive_rate: f64, ttl_ms: i64) -> Self {
        Self {
            filter: BloomFilter::optimal(capacity, false_positive_rate),
            entries: HashMap::new(),
            ttl_ms,
            capacity,
            false_positive_rate,
        }
    }

    /// Record a fingerprint at `now_ms`.
    pub fn add(&mut self, fingerprint: &str, now_ms: i64) {
        self.filter.insert(fingerprint.as_bytes());
        self.entries.insert(fingerprint.to_string(), now_ms);
    }

    /// Membership test. A `true` may be a false positive within the
    /// configured rate; a `false` is definitive.
    pub fn has(&self, fingerprint: &str) -> bool {
        self.filter.contains(fingerprint.as_bytes())
    }

    /// Drop entries past their TTL and rebuild the bits from the
    /// survivors. Returns the number of entries removed.
    pub fn prune_expired(&mut self, now_ms: i64) -> usize {
        let before = self.entries.len();
        let ttl_ms = self.ttl_ms;
        self.entries.retain(|_, &mut inserted| now_ms - inserted <= ttl_ms);
        let removed = before - self.entries.len();

        if removed > 0 {
            self.filter = BloomFilter::optimal(self.capacity, self.false_positive_rate);
            for fingerprint in self.entries.keys() {
                self.filter.insert(fingerprint.as_bytes());
            }
        }
        removed
    }

    /// Current statistics.
    pub fn stats(&self, now_ms: i64) -> DedupStats {
        let expired = self
            .entries
            .values()
            .filter(|&&inserted| now_ms - inserted > self.ttl_ms)
            .count();
        DedupStats {
            total_entries: self.entries.len(),
            active_entries: self.entries.len() - expired,
            expired_entries: expired,
            ttl_ms: self.ttl_ms,
        }
    }

    /// Serialize the full state to a JSON snapshot.
    pub fn snapshot(&self) -> Result<String> {
        let snapshot = DedupSnapshot {
            ttl_ms: self.ttl_ms,
            capacity: self.capacity,
            false_positive_rate: self.false_positive_rate,
            filter: self.filter.clone(),
            entries: self.entries.clone(),
        };
        serde_json::to_string(&snapshot).map_err(|e| MeshError::Snapshot(e.to_string()))
    }

    /// Restore from a JSON snapshot, pruning entries that expired while
    /// the process was down.
    pub fn restore(json: &str, now_ms: i64) -> Result<Self> {
        let snapshot: DedupSnapshot =
            serde_json::from_str(json).map_err(|e| MeshError::Snapshot(e.to_string()))?;
        let mut filter = Self {
            filter: snapshot.filter,
            entries: snapshot.entries,
            ttl_ms: snapshot.ttl_ms,
            capacity: snapshot.capacity,
            false_positive_rate: snapshot.false_positive_rate,
        };
        filter.prune_expired(now_ms);
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 5 * 60 * 1000;

    fn make_filter() -> TtlBloomFilter {
        TtlBloomFilter::new(1000, 0.01, TTL)
    }

    #[test]
    fn test_add_then_has() {
        let mut filter = make_filter();
        assert!(!filter.has("fp-1"));
        filter.add("fp-1", 0);
        assert!(filter.has("fp-1"));
    }

    #[test]
    fn test_prune_expires_entries() {
        let mut filter = make_filter();
        filter.add("fp-1", 0);
        assert!(filter.has("fp-1"));

        let removed = filter.prune_expired(TTL + 1);
        assert_eq!(removed, 1);
        assert!(!filter.has("fp-1"));
    }

    #[test]
    fn test_prune_keeps_live_entries() {
        let mut filter = make_filter();
        filter.add("old", 0);
        filter.add("new", TTL);

        let removed = filter.prune_expired(TTL + 1);
        assert_eq!(removed, 1);
        assert!(!filter.has("old"));
        assert!(filter.has("new"));
    }

    #[test]
    fn test_stats() {
        let mut filter = make_filter();
        filter.add("a", 0);
        filter.add("b", TTL);

        let stats = filter.stats(TTL + 1);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.active_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.ttl_ms, TTL);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut filter = make_filter();
        filter.add("fp-1", 1000);
        filter.add("fp-2", 2000);

        let json = filter.snapshot().expect("snapshot");
        let restored = TtlBloomFilter::restore(&json, 3000).expect("restore");
        assert!(restored.has("fp-1"));
        assert!(restored.has("fp-2"));
        assert_eq!(restored.stats(3000).total_entries, 2);
    }

    #[test]
    fn test_restore_prunes_stale() {
        let mut filter = make_filter();
        filter.add("stale", 0);
        filter.add("live", TTL);

        let json = filter.snapshot().expect("snapshot");
        let restored = TtlBloomFilter::restore(&json, TTL + 1).expect("restore");
        assert!(!restored.has("stale"));
        assert!(restored.has("live"));
    }

    #[test]
    fn test_garbage_snapshot_rejected() {
        assert!(TtlBloomFilter::restore("not json", 0).is_err());
    }
}
