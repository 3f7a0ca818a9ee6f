//! Relay queue queries (`relay_packets`).
//!
//! Rows store the post-decrement hop count, so a row's fields rebuild
//! the exact frame to re-broadcast. The `device_uuid` is the packet's
//! immediate source and becomes the blackout entry on send.

use rusqlite::Connection;

use crate::Result;

/// A queued relay row.
#[derive(Clone, Debug)]
pub struct RelayRow {
    pub id: i64,
    pub version: u8,
    pub packet_type: u8,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub allowed_hops: u8,
    pub device_uuid: String,
    pub created_at: i64,
}

/// Enqueue a packet for relay.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    version: u8,
    packet_type: u8,
    timestamp: i64,
    payload: &[u8],
    allowed_hops: u8,
    device_uuid: &str,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO relay_packets
         (version, type, timestamp, payload, allowed_hops, device_uuid, relayed, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        rusqlite::params![
            version,
            packet_type,
            timestamp,
            payload,
            allowed_hops,
            device_uuid,
            now_ms,
        ],
    )?;
    Ok(())
}

/// Unrelayed rows in arrival order.
pub fn list_unrelayed(conn: &Connection, limit: usize) -> Result<Vec<RelayRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, version, type, timestamp, payload, allowed_hops, device_uuid, created_at
         FROM relay_packets WHERE relayed = 0 ORDER BY id ASC LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RelayRow {
                id: row.get(0)?,
                version: row.get::<_, i64>(1)? as u8,
                packet_type: row.get::<_, i64>(2)? as u8,
                timestamp: row.get(3)?,
                payload: row.get(4)?,
                allowed_hops: row.get::<_, i64>(5)? as u8,
                device_uuid: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remove a row after its broadcast went out.
pub fn remove(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM relay_packets WHERE id = ?1", [id])?;
    Ok(())
}

/// FIFO-evict the oldest rows beyond the queue cap. Returns the number
/// removed.
pub fn delete_oldest(conn: &Connection, n: usize) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM relay_packets WHERE id IN
         (SELECT id FROM relay_packets ORDER BY id ASC LIMIT ?1)",
        [n as i64],
    )?)
}

/// Count queued rows.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM relay_packets", [], |row| row.get(0))?)
}
