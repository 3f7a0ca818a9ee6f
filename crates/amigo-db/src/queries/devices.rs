//! Connected-device queries (`connected_devices`).
//!
//! Mirrors the radio layer's view of nearby peers. Rows are upserted
//! from connection callbacks and flipped on disconnect rather than
//! deleted, so RSSI history survives brief drops.

use amigo_types::ConnectedDevice;
use rusqlite::Connection;

use crate::Result;

/// Mark a device connected, refreshing RSSI if reported.
pub fn mark_connected(
    conn: &Connection,
    device_uuid: &str,
    rssi: Option<i32>,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO connected_devices (device_uuid, last_seen_rssi, connected, updated_at)
         VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(device_uuid) DO UPDATE SET
             last_seen_rssi = COALESCE(excluded.last_seen_rssi, last_seen_rssi),
             connected = 1,
             updated_at = excluded.updated_at",
        rusqlite::params![device_uuid, rssi, now_ms],
    )?;
    Ok(())
}

/// Mark a device disconnected.
pub fn mark_disconnected(conn: &Connection, device_uuid: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE connected_devices SET connected = 0, updated_at = ?2 WHERE device_uuid = ?1",
        rusqlite::params![device_uuid, now_ms],
    )?;
    Ok(())
}

/// Record an RSSI reading.
pub fn record_rssi(conn: &Connection, device_uuid: &str, rssi: i32, now_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE connected_devices SET last_seen_rssi = ?2, updated_at = ?3 WHERE device_uuid = ?1",
        rusqlite::params![device_uuid, rssi, now_ms],
    )?;
    Ok(())
}

/// Currently connected devices.
pub fn list_connected(conn: &Connection) -> Result<Vec<ConnectedDevice>> {
    let mut stmt = conn.prepare(
        "SELECT device_uuid, last_seen_rssi, connected, updated_at
         FROM connected_devices WHERE connected = 1 ORDER BY device_uuid",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ConnectedDevice {
                device_uuid: row.get(0)?,
                last_seen_rssi: row.get(1)?,
                connected: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_connect_and_list() {
        let conn = test_db();
        mark_connected(&conn, "dev-a", Some(-40), 1000).expect("connect");
        mark_connected(&conn, "dev-b", None, 1000).expect("connect");

        let devices = list_connected(&conn).expect("list");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].last_seen_rssi, Some(-40));
        assert_eq!(devices[1].last_seen_rssi, None);
    }

    #[test]
    fn test_disconnect_removes_from_view() {
        let conn = test_db();
        mark_connected(&conn, "dev-a", Some(-40), 1000).expect("connect");
        mark_disconnected(&conn, "dev-a", 2000).expect("disconnect");
        assert!(list_connected(&conn).expect("list").is_empty());
    }

    #[test]
    fn test_reconnect_keeps_rssi() {
        let conn = test_db();
        mark_connected(&conn, "dev-a", Some(-40), 1000).expect("connect");
        mark_disconnected(&conn, "dev-a", 2000).expect("disconnect");
        // Reconnect without a fresh reading.
        mark_connected(&conn, "dev-a", None, 3000).expect("reconnect");

        let devices = list_connected(&conn).expect("list");
        assert_eq!(devices[0].last_seen_rssi, Some(-40));
        assert_eq!(devices[0].updated_at, 3000);
    }

    #[test]
    fn test_record_rssi() {
        let conn = test_db();
        mark_connected(&conn, "dev-a", Some(-40), 1000).expect("connect");
        record_rssi(&conn, "dev-a", -55, 2000).expect("rssi");
        assert_eq!(
            list_connected(&conn).expect("list")[0].last_seen_rssi,
            Some(-55)
        );
    }
}
