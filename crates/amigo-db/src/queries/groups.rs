//! Group and membership queries (`groups`, `group_members`).

use amigo_types::Group;
use rusqlite::Connection;

use crate::{DbError, Result};

/// Insert a group, or refresh its name and activity on conflict.
pub fn upsert(conn: &Connection, group: &Group, now_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO groups (id, name, admin, expandable, last_active_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             last_active_at = excluded.last_active_at",
        rusqlite::params![
            group.id,
            group.name,
            group.admin,
            group.expandable,
            group.last_active_at,
            now_ms,
        ],
    )?;
    Ok(())
}

/// Get a group by id.
pub fn get(conn: &Connection, id: &str) -> Result<Group> {
    conn.query_row(
        "SELECT id, name, admin, expandable, last_active_at FROM groups WHERE id = ?1",
        [id],
        |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                admin: row.get(2)?,
                expandable: row.get(3)?,
                last_active_at: row.get(4)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound("group".into()),
        other => DbError::Sqlite(other),
    })
}

/// List all groups, most recently active first.
pub fn list(conn: &Connection) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, admin, expandable, last_active_at
         FROM groups ORDER BY last_active_at DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                admin: row.get(2)?,
                expandable: row.get(3)?,
                last_active_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Bump a group's last activity.
pub fn touch(conn: &Connection, id: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE groups SET last_active_at = ?2 WHERE id = ?1",
        rusqlite::params![id, now_ms],
    )?;
    Ok(())
}

/// Delete a group. Membership edges cascade.
pub fn remove(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM groups WHERE id = ?1", [id])?;
    Ok(())
}

/// Add a membership edge. Replays are ignored.
pub fn add_member(conn: &Connection, group_id: &str, contact_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, contact_id) VALUES (?1, ?2)",
        rusqlite::params![group_id, contact_id],
    )?;
    Ok(())
}

/// Contact ids of a group's members.
pub fn member_contact_ids(conn: &Connection, group_id: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT contact_id FROM group_members WHERE group_id = ?1 ORDER BY contact_id",
    )?;
    let rows = stmt
        .query_map([group_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
