//! Pending delivery-ack queries (`pending_delivery_acks`).
//!
//! The receiver side's durable list of acks it owes. Rows are broadcast
//! on a cadence and purged by age rather than by confirmation — the ack
//! itself is fire-and-forget.

use amigo_types::PendingDeliveryAck;
use rusqlite::Connection;

use crate::Result;

/// Enqueue an ack. Replays of the same (message, recipient) pair are
/// ignored.
pub fn insert(conn: &Connection, ack: &PendingDeliveryAck) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO pending_delivery_acks
         (message_id, recipient_verification_key, retry_count, last_retry_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            ack.message_id,
            ack.recipient_verification_key,
            ack.retry_count,
            ack.last_retry_at,
            ack.created_at,
        ],
    )?;
    Ok(())
}

/// Rows due for a broadcast.
pub fn due_for_retry(conn: &Connection, now_ms: i64, interval_ms: i64) -> Result<Vec<PendingDeliveryAck>> {
    let mut stmt = conn.prepare(
        "SELECT message_id, recipient_verification_key, retry_count, last_retry_at, created_at
         FROM pending_delivery_acks
         WHERE last_retry_at IS NULL OR ?1 - last_retry_at >= ?2
         ORDER BY created_at ASC",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![now_ms, interval_ms], row_to_ack)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record one broadcast attempt.
pub fn mark_retried(conn: &Connection, message_id: &str, recipient: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE pending_delivery_acks
         SET retry_count = retry_count + 1, last_retry_at = ?3
         WHERE message_id = ?1 AND recipient_verification_key = ?2",
        rusqlite::params![message_id, recipient, now_ms],
    )?;
    Ok(())
}

/// Purge rows older than the cutoff. Returns the number removed.
pub fn purge_older_than(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM pending_delivery_acks WHERE created_at < ?1",
        [cutoff_ms],
    )?)
}

/// Count queued rows.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM pending_delivery_acks",
        [],
        |row| row.get(0),
    )?)
}

fn row_to_ack(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingDeliveryAck> {
    Ok(PendingDeliveryAck {
        message_id: row.get(0)?,
        recipient_verification_key: row.get(1)?,
        retry_count: row.get(2)?,
        last_retry_at: row.get(3)?,
        created_at: row.get(4)?,
    })
}
