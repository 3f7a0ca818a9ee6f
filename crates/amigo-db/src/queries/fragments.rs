//! Fragment staging queries (`fragments`).
//!
//! Fragments wait here until their group completes or the TTL expires.
//! The `payload` column holds the full fragment payload (header
//! included), so a stored row both feeds the reassembler and re-serves
//! the original fragment packet to gossip peers.

use rusqlite::Connection;

use crate::Result;

/// A staged fragment row.
#[derive(Clone, Debug)]
pub struct FragmentRow {
    pub id: i64,
    pub fragment_id: Vec<u8>,
    pub position: u16,
    pub version: u8,
    pub fragment_type: u8,
    pub timestamp: i64,
    pub payload: Vec<u8>,
    pub allowed_hops: u8,
    pub created_at: i64,
}

/// Stage a fragment. A replay of the same (fragment_id, position) is
/// ignored. Returns `true` if a row was inserted.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    fragment_id: &[u8; 8],
    position: u16,
    version: u8,
    fragment_type: u8,
    timestamp: i64,
    payload: &[u8],
    allowed_hops: u8,
    now_ms: i64,
) -> Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM fragments WHERE fragment_id = ?1 AND position = ?2",
        rusqlite::params![fragment_id.as_slice(), position],
        |row| row.get(0),
    )?;
    if exists > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO fragments
         (fragment_id, position, version, type, timestamp, payload, allowed_hops, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            fragment_id.as_slice(),
            position,
            version,
            fragment_type,
            timestamp,
            payload,
            allowed_hops,
            now_ms,
        ],
    )?;
    Ok(true)
}

/// All staged fragments of one group.
pub fn list_group(conn: &Connection, fragment_id: &[u8; 8]) -> Result<Vec<FragmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, fragment_id, position, version, type, timestamp, payload, allowed_hops, created_at
         FROM fragments WHERE fragment_id = ?1 ORDER BY position ASC",
    )?;

    let rows = stmt
        .query_map([fragment_id.as_slice()], row_to_fragment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count staged fragments of one group.
pub fn count_group(conn: &Connection, fragment_id: &[u8; 8]) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM fragments WHERE fragment_id = ?1",
        [fragment_id.as_slice()],
        |row| row.get(0),
    )?)
}

/// Delete a whole group (after assembly or on mismatch).
pub fn delete_group(conn: &Connection, fragment_id: &[u8; 8]) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM fragments WHERE fragment_id = ?1",
        [fragment_id.as_slice()],
    )?)
}

/// Purge fragments staged before the cutoff. Returns the number removed.
pub fn purge_older_than(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM fragments WHERE created_at < ?1",
        [cutoff_ms],
    )?)
}

/// Count all staged fragments.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM fragments", [], |row| row.get(0))?)
}

fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<FragmentRow> {
    Ok(FragmentRow {
        id: row.get(0)?,
        fragment_id: row.get(1)?,
        position: row.get::<_, i64>(2)? as u16,
        version: row.get::<_, i64>(3)? as u8,
        fragment_type: row.get::<_, i64>(4)? as u8,
        timestamp: row.get(5)?,
        payload: row.get(6)?,
        allowed_hops: row.get::<_, i64>(7)? as u8,
        created_at: row.get(8)?,
    })
}
