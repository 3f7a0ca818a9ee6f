//! Application outbox queries (`outgoing_messages`).
//!
//! Rows live until a matching delivery ack arrives or the retry budget
//! runs out. Retries preserve insertion order (`ORDER BY timestamp ASC`).

use amigo_types::{ChatMessage, OutgoingMessage};
use rusqlite::Connection;

use crate::Result;

/// Insert a message into the outbox at send time.
pub fn insert(conn: &Connection, message: &ChatMessage, now_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO outgoing_messages
         (id, sender, contents, timestamp, group_id, retry_count, last_retry_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)",
        rusqlite::params![
            message.id,
            message.sender,
            message.contents,
            message.timestamp,
            message.group_id,
            now_ms,
        ],
    )?;
    Ok(())
}

/// Rows due for a retry: attempts remain and the interval has elapsed
/// (or the row has never been retried).
pub fn due_for_retry(
    conn: &Connection,
    now_ms: i64,
    interval_ms: i64,
    max_attempts: u32,
) -> Result<Vec<OutgoingMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, contents, timestamp, group_id, retry_count, last_retry_at, created_at
         FROM outgoing_messages
         WHERE retry_count < ?1
           AND (last_retry_at IS NULL OR ?2 - last_retry_at >= ?3)
         ORDER BY timestamp ASC",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![max_attempts, now_ms, interval_ms],
            row_to_outgoing,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record one retry attempt.
pub fn mark_retried(conn: &Connection, id: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE outgoing_messages
         SET retry_count = retry_count + 1, last_retry_at = ?2
         WHERE id = ?1",
        rusqlite::params![id, now_ms],
    )?;
    Ok(())
}

/// Retire a row on delivery ack. Returns `true` if a row was removed.
pub fn retire(conn: &Connection, message_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM outgoing_messages WHERE id = ?1",
        [message_id],
    )?;
    Ok(changed > 0)
}

/// Drop rows whose retry budget is exhausted. Returns the number removed.
pub fn drop_exhausted(conn: &Connection, max_attempts: u32) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM outgoing_messages WHERE retry_count >= ?1",
        [max_attempts],
    )?)
}

/// Count queued rows.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM outgoing_messages", [], |row| row.get(0))?)
}

/// Fetch one row by id.
pub fn get(conn: &Connection, id: &str) -> Result<Option<OutgoingMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, contents, timestamp, group_id, retry_count, last_retry_at, created_at
         FROM outgoing_messages WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map([id], row_to_outgoing)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn row_to_outgoing(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutgoingMessage> {
    Ok(OutgoingMessage {
        message: ChatMessage {
            id: row.get(0)?,
            sender: row.get(1)?,
            contents: row.get(2)?,
            timestamp: row.get(3)?,
            group_id: row.get(4)?,
        },
        retry_count: row.get(5)?,
        last_retry_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}
