//! Store-and-forward relay.
//!
//! Relaying is a blind flood bounded by three mechanisms: the dedup
//! filter upstream (a packet is relayed at most once), the hop budget
//! (decremented before enqueue; rows store the post-decrement value and
//! re-broadcast verbatim), and the source blackout (the frame is never
//! sent back to the peer it arrived from). Pacing between sends keeps
//! the radio from starving its own traffic.

use amigo_db::queries::relay as relay_q;
use amigo_wire::packet::{Packet, PacketType};
use rusqlite::Connection;

use crate::config::MeshConfig;
use crate::radio::Radio;
use crate::Result;

/// Rows flushed per pass; the pass re-runs until the queue drains.
const FLUSH_BATCH: usize = 32;

/// Enqueue a decoded inbound packet for relay, hop budget already spent.
///
/// The caller has verified `packet.allowed_hops > 0` and that the type
/// is relayable; the stored row carries `allowed_hops - 1`. Beyond the
/// queue cap, the oldest rows are evicted first.
pub fn enqueue(
    conn: &Connection,
    packet: &Packet,
    source_device: &str,
    config: &MeshConfig,
    now_ms: i64,
) -> Result<()> {
    relay_q::insert(
        conn,
        packet.version,
        packet.packet_type.to_wire(),
        packet.timestamp,
        &packet.payload,
        packet.allowed_hops - 1,
        source_device,
        now_ms,
    )?;

    let queued = relay_q::count(conn)?;
    let cap = config.relay.queue_cap as i64;
    if queued > cap {
        let evicted = relay_q::delete_oldest(conn, (queued - cap) as usize)?;
        tracing::warn!(evicted, "relay queue over cap, evicted oldest");
    }
    Ok(())
}

/// Broadcast queued rows with the source peer blacked out, removing each
/// row after its send. Returns the number relayed.
pub async fn flush(
    conn: &Connection,
    radio: &dyn Radio,
    config: &MeshConfig,
) -> Result<usize> {
    let mut relayed = 0;
    loop {
        let rows = relay_q::list_unrelayed(conn, FLUSH_BATCH)?;
        if rows.is_empty() {
            return Ok(relayed);
        }

        for row in rows {
            let packet_type = match PacketType::from_wire(row.packet_type) {
                Ok(packet_type) => packet_type,
                Err(e) => {
                    // A row this implementation cannot re-frame is dead weight.
                    tracing::warn!(error = %e, id = row.id, "dropping unrelayable row");
                    relay_q::remove(conn, row.id)?;
                    continue;
                }
            };

            let packet = Packet {
                version: row.version,
                packet_type,
                timestamp: row.timestamp,
                allowed_hops: row.allowed_hops,
                payload: row.payload,
            };
            let blackout = [row.device_uuid.clone()];
            radio.broadcast_packet(&packet.to_bytes(), &blackout).await?;
            relay_q::remove(conn, row.id)?;
            relayed += 1;

            if config.relay.pacing_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(config.relay.pacing_ms))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{ChannelRadio, Transmission};

    fn test_config() -> MeshConfig {
        let mut config = MeshConfig::default();
        config.relay.pacing_ms = 0;
        config
    }

    fn make_packet(hops: u8) -> Packet {
        Packet::new(PacketType::Message, 1000, hops, vec![1, 2, 3]).expect("packet")
    }

    #[tokio::test]
    async fn test_enqueue_stores_post_decrement() {
        let conn = amigo_db::open_memory().expect("db");
        enqueue(&conn, &make_packet(3), "dev-a", &test_config(), 1000).expect("enqueue");

        let rows = relay_q::list_unrelayed(&conn, 10).expect("list");
        assert_eq!(rows[0].allowed_hops, 2);
        assert_eq!(rows[0].device_uuid, "dev-a");
    }

    #[tokio::test]
    async fn test_flush_blacks_out_source() {
        let conn = amigo_db::open_memory().expect("db");
        let radio = ChannelRadio::new();
        let config = test_config();
        enqueue(&conn, &make_packet(2), "dev-a", &config, 1000).expect("enqueue");

        let relayed = flush(&conn, &radio, &config).await.expect("flush");
        assert_eq!(relayed, 1);

        let sent = radio.take_sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Transmission::Broadcast { bytes, blackout } => {
                assert_eq!(blackout, &["dev-a".to_string()]);
                let packet = Packet::from_bytes(bytes).expect("decode");
                assert_eq!(packet.allowed_hops, 1);
            }
            other => panic!("unexpected transmission: {other:?}"),
        }

        // Queue drained.
        assert_eq!(relay_q::count(&conn).expect("count"), 0);
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let conn = amigo_db::open_memory().expect("db");
        let mut config = test_config();
        config.relay.queue_cap = 3;

        for i in 0..5i64 {
            let packet = Packet::new(PacketType::Message, i, 2, vec![i as u8]).expect("packet");
            enqueue(&conn, &packet, "dev", &config, 1000 + i).expect("enqueue");
        }

        let rows = relay_q::list_unrelayed(&conn, 10).expect("list");
        assert_eq!(rows.len(), 3);
        // The two oldest are gone.
        assert_eq!(rows[0].payload, vec![2u8]);
    }
}
