//! Message history queries.

use amigo_types::ChatMessage;
use rusqlite::Connection;

use crate::Result;

/// Insert a message. Replays of an already-stored id are ignored, so
/// duplicate delivery never duplicates history.
///
/// Returns `true` if a row was inserted.
pub fn insert(conn: &Connection, message: &ChatMessage, now_ms: i64) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO messages (id, group_id, sender, contents, timestamp, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            message.id,
            message.group_id,
            message.sender,
            message.contents,
            message.timestamp,
            now_ms,
        ],
    )?;
    Ok(changed > 0)
}

/// Whether a message id is already stored.
pub fn exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List a group's messages oldest-first.
pub fn list_for_group(conn: &Connection, group_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, sender, contents, timestamp
         FROM messages WHERE group_id = ?1 ORDER BY timestamp ASC",
    )?;

    let rows = stmt
        .query_map([group_id], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count all stored messages.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
}

/// Delete messages older than the cutoff. Returns the number removed.
pub fn delete_older_than(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM messages WHERE timestamp < ?1",
        [cutoff_ms],
    )?)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender: row.get(2)?,
        contents: row.get(3)?,
        timestamp: row.get(4)?,
    })
}
