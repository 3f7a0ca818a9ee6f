//! Pending-decryption queries (`pending_decryption`).
//!
//! Ciphertexts that arrived before their group's key material. The
//! `payload_hash` column (BLAKE3 of the encrypted payload) enforces the
//! no-duplicates invariant under replay.

use rusqlite::Connection;

use crate::Result;

/// A buffered ciphertext awaiting key material.
#[derive(Clone, Debug)]
pub struct PendingRow {
    pub id: i64,
    pub encrypted_payload: Vec<u8>,
    pub created_at: i64,
}

/// Buffer a ciphertext. Duplicates by payload hash are ignored.
///
/// Returns `true` if a row was inserted.
pub fn insert(
    conn: &Connection,
    encrypted_payload: &[u8],
    payload_hash: &[u8; 32],
    now_ms: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO pending_decryption (encrypted_payload, payload_hash, created_at)
         VALUES (?1, ?2, ?3)",
        rusqlite::params![encrypted_payload, payload_hash.as_slice(), now_ms],
    )?;
    Ok(changed > 0)
}

/// All buffered rows, oldest first (the drain order).
pub fn list_oldest_first(conn: &Connection) -> Result<Vec<PendingRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, encrypted_payload, created_at
         FROM pending_decryption ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(PendingRow {
                id: row.get(0)?,
                encrypted_payload: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Remove a drained row.
pub fn remove(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM pending_decryption WHERE id = ?1", [id])?;
    Ok(())
}

/// Purge rows older than the cutoff. Returns the number removed.
pub fn purge_older_than(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM pending_decryption WHERE created_at < ?1",
        [cutoff_ms],
    )?)
}

/// Count buffered rows.
pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM pending_decryption", [], |row| row.get(0))?)
}
