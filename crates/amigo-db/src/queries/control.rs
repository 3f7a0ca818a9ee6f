//! Control outbox queries (`outgoing_amigo_messages`).
//!
//! Welcomes and path updates awaiting evidence that the recipient's
//! group state advanced. Retries preserve creation order.

use amigo_types::{ControlPacketType, OutgoingControlMessage};
use rusqlite::Connection;

use crate::{DbError, Result};

/// Insert a control row.
pub fn insert(conn: &Connection, control: &OutgoingControlMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO outgoing_amigo_messages
         (id, packet_type, payload_base64, recipient_verification_key,
          retry_count, last_retry_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            control.id,
            packet_type_to_wire(control.packet_type),
            control.payload_base64,
            control.recipient_verification_key,
            control.retry_count,
            control.last_retry_at,
            control.created_at,
        ],
    )?;
    Ok(())
}

/// Rows due for a retry, oldest-created first.
pub fn due_for_retry(
    conn: &Connection,
    now_ms: i64,
    interval_ms: i64,
    max_attempts: u32,
) -> Result<Vec<OutgoingControlMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, packet_type, payload_base64, recipient_verification_key,
                retry_count, last_retry_at, created_at
         FROM outgoing_amigo_messages
         WHERE retry_count < ?1
           AND (last_retry_at IS NULL OR ?2 - last_retry_at >= ?3)
         ORDER BY created_at ASC",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![max_attempts, now_ms, interval_ms],
            row_to_control,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record one retry attempt.
pub fn mark_retried(conn: &Connection, id: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE outgoing_amigo_messages
         SET retry_count = retry_count + 1, last_retry_at = ?2
         WHERE id = ?1",
        rusqlite::params![id, now_ms],
    )?;
    Ok(())
}

/// Retire every control row addressed to a recipient whose state advance
/// has been observed. Returns the number removed.
pub fn retire_for_recipient(conn: &Connection, recipient_verification_key: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM outgoing_amigo_messages WHERE recipient_verification_key = ?1",
        [recipient_verification_key],
    )?)
}

/// Drop rows whose retry budget is exhausted. Returns the number removed.
pub fn drop_exhausted(conn: &Connection, max_attempts: u32) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM outgoing_amigo_messages WHERE retry_count >= ?1",
        [max_attempts],
    )?)
}

/// Count queued rows.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM outgoing_amigo_messages",
        [],
        |row| row.get(0),
    )?)
}

fn packet_type_to_wire(packet_type: ControlPacketType) -> i64 {
    match packet_type {
        ControlPacketType::Welcome => 0,
        ControlPacketType::PathUpdate => 1,
    }
}

fn packet_type_from_wire(value: i64) -> rusqlite::Result<ControlPacketType> {
    match value {
        0 => Ok(ControlPacketType::Welcome),
        1 => Ok(ControlPacketType::PathUpdate),
        other => Err(rusqlite::Error::IntegralValueOutOfRange(1, other)),
    }
}

fn row_to_control(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutgoingControlMessage> {
    Ok(OutgoingControlMessage {
        id: row.get(0)?,
        packet_type: packet_type_from_wire(row.get(1)?)?,
        payload_base64: row.get(2)?,
        recipient_verification_key: row.get(3)?,
        retry_count: row.get(4)?,
        last_retry_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Fetch one row by id.
pub fn get(conn: &Connection, id: &str) -> Result<OutgoingControlMessage> {
    conn.query_row(
        "SELECT id, packet_type, payload_base64, recipient_verification_key,
                retry_count, last_retry_at, created_at
         FROM outgoing_amigo_messages WHERE id = ?1",
        [id],
        row_to_control,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound("control message".into()),
        other => DbError::Sqlite(other),
    })
}
