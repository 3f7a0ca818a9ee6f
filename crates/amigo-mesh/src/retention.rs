//! Age-based garbage collection.
//!
//! One pass covers everything with a retention bound: stored messages,
//! dedup filter entries, buffered ciphertexts, and staged fragments.

use amigo_db::queries::{fragments as fragments_q, messages as messages_q, pending as pending_q};
use rusqlite::Connection;

use crate::config::MeshConfig;
use crate::dedup::TtlBloomFilter;
use crate::Result;

/// What one GC pass removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Messages past the retention window.
    pub messages_purged: usize,
    /// Dedup entries past their TTL.
    pub dedup_pruned: usize,
    /// Pending-decryption rows past the 24h bound.
    pub pending_purged: usize,
    /// Staged fragments past their TTL.
    pub fragments_purged: usize,
}

/// Run one garbage-collection pass.
pub fn run_gc(
    conn: &Connection,
    dedup: &mut TtlBloomFilter,
    config: &MeshConfig,
    now_ms: i64,
) -> Result<GcReport> {
    let report = GcReport {
        messages_purged: messages_q::delete_older_than(conn, now_ms - config.retention_window_ms())?,
        dedup_pruned: dedup.prune_expired(now_ms),
        pending_purged: pending_q::purge_older_than(conn, now_ms - config.pending_max_age_ms())?,
        fragments_purged: fragments_q::purge_older_than(conn, now_ms - config.fragment_ttl_ms())?,
    };

    if report != GcReport::default() {
        tracing::debug!(
            messages = report.messages_purged,
            dedup = report.dedup_pruned,
            pending = report.pending_purged,
            fragments = report.fragments_purged,
            "retention pass"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amigo_types::ChatMessage;

    fn make_message(id: &str, timestamp: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            group_id: "aabb".to_string(),
            sender: "cafe".to_string(),
            contents: "hola".to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_gc_purges_only_aged_rows() {
        let conn = amigo_db::open_memory().expect("db");
        let mut config = MeshConfig::default();
        config.retention.message_retention_minutes = 10;
        let mut dedup = TtlBloomFilter::new(100, 0.01, config.dedup_ttl_ms());

        let now = 100 * 60 * 1000;
        // 100 messages spanning the last 20 minutes.
        for i in 0..100i64 {
            let ts = now - 20 * 60 * 1000 + i * 12 * 1000;
            messages_q::insert(&conn, &make_message(&format!("m{i}"), ts), now).expect("insert");
        }
        dedup.add("aged", now - config.dedup_ttl_ms() - 1);

        let report = run_gc(&conn, &mut dedup, &config, now).expect("gc");
        assert!(report.messages_purged > 0);
        assert_eq!(report.dedup_pruned, 1);

        // Everything left is within the window.
        let remaining = messages_q::count(&conn).expect("count");
        assert_eq!(remaining as usize, 100 - report.messages_purged);
        for message in messages_q::list_for_group(&conn, "aabb").expect("list") {
            assert!(message.timestamp >= now - config.retention_window_ms());
        }
    }

    #[test]
    fn test_gc_purges_pending_and_fragments() {
        let conn = amigo_db::open_memory().expect("db");
        let config = MeshConfig::default();
        let mut dedup = TtlBloomFilter::new(100, 0.01, config.dedup_ttl_ms());

        let now = 48 * 60 * 60 * 1000;
        pending_q::insert(&conn, b"old", &amigo_crypto::blake3::hash(b"old"), 1000)
            .expect("insert");
        pending_q::insert(
            &conn,
            b"new",
            &amigo_crypto::blake3::hash(b"new"),
            now - 1000,
        )
        .expect("insert");
        fragments_q::insert(&conn, &[1; 8], 0, 1, 3, 1000, b"chunk", 2, 1000).expect("insert");

        let report = run_gc(&conn, &mut dedup, &config, now).expect("gc");
        assert_eq!(report.pending_purged, 1);
        assert_eq!(report.fragments_purged, 1);
        assert_eq!(pending_q::count(&conn).expect("count"), 1);
    }
}
