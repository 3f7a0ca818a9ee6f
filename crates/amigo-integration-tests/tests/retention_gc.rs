//! Integration test: retention purge.
//!
//! 100 messages spanning the last twenty minutes, a 10-minute window:
//! the GC pass removes exactly the old half and prunes aged dedup
//! entries.

use amigo_db::queries::messages;
use amigo_integration_tests::{test_config, TestNode};
use amigo_mesh::core::CoreState;
use amigo_mesh::retention::run_gc;
use amigo_types::ChatMessage;

#[tokio::test(start_paused = true)]
async fn retention_purges_old_messages_and_bloom_entries() {
    let mut config = test_config();
    config.retention.message_retention_minutes = 10;
    let node = TestNode::with_config("alice", config.clone());

    let now = 1_700_000_000_000i64;
    let window_ms = config.retention_window_ms();

    {
        let guard = node.core.state().lock().await;
        for i in 0..100i64 {
            // Timestamps from now-20min up to now.
            let timestamp = now - 20 * 60 * 1000 + i * (20 * 60 * 1000 / 100);
            let message = ChatMessage {
                id: format!("m{i}"),
                group_id: "aabb".to_string(),
                sender: "cafe".to_string(),
                contents: "retained?".to_string(),
                timestamp,
            };
            messages::insert(&guard.conn, &message, now).expect("insert");
        }
    }

    // Aged dedup entries for the bloom prune to find.
    {
        let mut guard = node.core.state().lock().await;
        guard.dedup.add("aged-a", now - config.dedup_ttl_ms() - 1000);
        guard.dedup.add("aged-b", now - config.dedup_ttl_ms() - 2000);
        guard.dedup.add("fresh", now);
    }

    let report = {
        let mut guard = node.core.state().lock().await;
        let CoreState { conn, dedup, .. } = &mut *guard;
        run_gc(conn, dedup, &config, now).expect("gc pass")
    };

    assert!(report.messages_purged > 0, "old messages should purge");
    assert_eq!(report.dedup_pruned, 2, "aged bloom entries should prune");

    let guard = node.core.state().lock().await;
    let remaining = messages::list_for_group(&guard.conn, "aabb").expect("list");
    assert_eq!(remaining.len() + report.messages_purged, 100);
    for message in &remaining {
        assert!(
            message.timestamp >= now - window_ms,
            "message {} survived outside the window",
            message.id
        );
    }
    assert!(guard.dedup.has("fresh"));
    assert!(!guard.dedup.has("aged-a"));
}
