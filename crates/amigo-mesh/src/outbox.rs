//! Outbound retry passes.
//!
//! Three durable queues, one retirement rule each:
//!
//! - application messages retire on a matching `DELIVERY_ACK` or when
//!   their retry budget runs out;
//! - control payloads (welcomes, path updates) retire when traffic from
//!   the recipient proves the state advance, or on budget exhaustion;
//! - delivery acks are fire-and-forget and purge by age alone.
//!
//! Every application retry re-encrypts from the stored plaintext and
//! re-frames (re-fragmenting if needed) — the group epoch may have
//! advanced since the last attempt, so stale ciphertext is never reused.

use amigo_cgka::codec;
use amigo_cgka::member::Member;
use amigo_db::queries::{acks as acks_q, control as control_q, outbox as outbox_q};
use amigo_types::group::group_id_bytes;
use amigo_types::{ChatMessage, ControlPacketType};
use amigo_wire::fragment::{self, FragmentType};
use amigo_wire::packet::{Packet, PacketType};
use amigo_wire::payload::{self, AckPayload};
use rusqlite::Connection;

use crate::config::MeshConfig;
use crate::radio::Radio;
use crate::{MeshError, Result};

/// Delay between rows within one retry pass.
const RETRY_PACING_MS: u64 = 100;

/// Frame a payload into one packet, or into fragment packets when it
/// reaches the MTU threshold.
pub fn frame_payload(
    packet_type: PacketType,
    payload_bytes: Vec<u8>,
    timestamp: i64,
    config: &MeshConfig,
) -> Result<Vec<Vec<u8>>> {
    if payload_bytes.len() < config.ble.mtu_limit_bytes {
        let packet = Packet::new(
            packet_type,
            timestamp,
            config.ble.default_allowed_hops,
            payload_bytes,
        )?;
        return Ok(vec![packet.to_bytes()]);
    }

    let fragment_type = FragmentType::from_packet_type(packet_type)
        .ok_or(amigo_wire::WireError::UnknownFragmentType(
            packet_type.to_wire(),
        ))?;
    let fragments = fragment::split(&payload_bytes, fragment_type, config.chunk_size())?;
    fragments
        .into_iter()
        .map(|fragment| {
            Ok(Packet::new(
                PacketType::Fragment,
                timestamp,
                config.ble.default_allowed_hops,
                fragment.to_bytes(),
            )?
            .to_bytes())
        })
        .collect()
}

/// Encrypt a chat message for its group and frame it for broadcast.
pub fn build_message_packets(
    member: &mut Member,
    config: &MeshConfig,
    message: &ChatMessage,
) -> Result<Vec<Vec<u8>>> {
    let group_id = group_id_bytes(&message.group_id)
        .map_err(|_| MeshError::UnknownGroup(message.group_id.clone()))?;
    let plain = payload::encode_message(message);
    let ciphertext = member.encrypt_for_group(&group_id, &plain)?;
    let payload_bytes = codec::to_vec(&ciphertext)?;
    frame_payload(PacketType::Message, payload_bytes, message.timestamp, config)
}

/// One pass over the application outbox. Returns the number of rows
/// re-broadcast.
pub async fn retry_outgoing_messages(
    conn: &Connection,
    member: &mut Member,
    radio: &dyn Radio,
    config: &MeshConfig,
    now_ms: i64,
) -> Result<usize> {
    let max_attempts = config.ble.outgoing_message_retry_max_attempts;
    let rows = outbox_q::due_for_retry(
        conn,
        now_ms,
        config.message_retry_interval_ms(),
        max_attempts,
    )?;

    let mut sent = 0;
    for row in rows {
        match build_message_packets(member, config, &row.message) {
            Ok(frames) => {
                for frame in frames {
                    radio.broadcast_packet(&frame, &[]).await?;
                }
                sent += 1;
            }
            Err(e) => {
                tracing::warn!(
                    message_id = row.message.id,
                    error = %e,
                    "outbox retry could not rebuild packets"
                );
            }
        }
        outbox_q::mark_retried(conn, &row.message.id, now_ms)?;
        pace().await;
    }

    let dropped = outbox_q::drop_exhausted(conn, max_attempts)?;
    if dropped > 0 {
        tracing::debug!(dropped, "dropped exhausted outbox rows");
    }
    Ok(sent)
}

/// One pass over the control outbox. Returns the number of rows
/// re-broadcast.
pub async fn retry_control_messages(
    conn: &Connection,
    radio: &dyn Radio,
    config: &MeshConfig,
    now_ms: i64,
) -> Result<usize> {
    let max_attempts = config.control_retry_max_attempts();
    let rows = control_q::due_for_retry(
        conn,
        now_ms,
        config.control_retry_interval_ms(),
        max_attempts,
    )?;

    let mut sent = 0;
    for row in rows {
        let payload_bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &row.payload_base64,
        )
        .map_err(|e| MeshError::Snapshot(format!("control payload base64: {e}")))?;

        let packet_type = match row.packet_type {
            ControlPacketType::Welcome => PacketType::AmigoWelcome,
            ControlPacketType::PathUpdate => PacketType::AmigoPathUpdate,
        };
        for frame in frame_payload(packet_type, payload_bytes, now_ms, config)? {
            radio.broadcast_packet(&frame, &[]).await?;
        }
        control_q::mark_retried(conn, &row.id, now_ms)?;
        sent += 1;
        pace().await;
    }

    let dropped = control_q::drop_exhausted(conn, max_attempts)?;
    if dropped > 0 {
        tracing::debug!(dropped, "dropped exhausted control rows");
    }
    Ok(sent)
}

/// One pass over the pending delivery acks: broadcast each due ack and
/// purge aged rows. Returns the number broadcast.
pub async fn retry_delivery_acks(
    conn: &Connection,
    radio: &dyn Radio,
    config: &MeshConfig,
    now_ms: i64,
) -> Result<usize> {
    let rows = acks_q::due_for_retry(conn, now_ms, config.ack_retry_interval_ms())?;

    let mut sent = 0;
    for row in rows {
        let ack = AckPayload {
            message_id: row.message_id.clone(),
            sender_verification_key: row.recipient_verification_key.clone(),
            timestamp: now_ms,
        };
        let packet = Packet::new(
            PacketType::DeliveryAck,
            now_ms,
            config.ble.default_allowed_hops,
            payload::encode_ack(&ack),
        )?;
        radio.broadcast_packet(&packet.to_bytes(), &[]).await?;
        acks_q::mark_retried(conn, &row.message_id, &row.recipient_verification_key, now_ms)?;
        sent += 1;
        pace().await;
    }

    let purged = acks_q::purge_older_than(conn, now_ms - config.ack_max_age_ms())?;
    if purged > 0 {
        tracing::debug!(purged, "purged aged delivery acks");
    }
    Ok(sent)
}

async fn pace() {
    tokio::time::sleep(std::time::Duration::from_millis(RETRY_PACING_MS)).await;
}
