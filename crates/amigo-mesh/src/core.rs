//! The serializing dispatcher.
//!
//! [`Core`] owns every piece of shared state behind one async lock: the
//! database connection, the member's group map, the dedup filter, and
//! the gossip caches. Inbound radio events hold the lock for one
//! packet's full decode → dedup → relay → handler sequence; the
//! periodic passes in [`crate::tasks`] acquire it per tick. Errors are
//! contained per packet — a malformed or hostile frame can never stall
//! the pipeline.

use std::sync::Arc;

use amigo_cgka::codec;
use amigo_cgka::group::{CgkaCiphertext, PathUpdate, Welcome};
use amigo_cgka::member::{Member, PathOutcome};
use amigo_cgka::CgkaError;
use amigo_db::queries::{
    acks as acks_q, contacts as contacts_q, control as control_q, devices as devices_q,
    fragments as fragments_q, groups as groups_q, messages as messages_q, outbox as outbox_q,
    pending as pending_q,
};
use amigo_types::group::{group_id_bytes, group_id_hex};
use amigo_types::{ChatMessage, ControlPacketType, Credential, Group, OutgoingControlMessage,
    PendingDeliveryAck};
use amigo_wire::fragment::Fragment;
use amigo_wire::packet::{self, Packet, PacketType, PACKET_VERSION};
use amigo_wire::payload::{self, AckPayload, AnnouncePayload};
use amigo_wire::sync::SyncPayload;
use rand::RngCore;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::config::MeshConfig;
use crate::dedup::TtlBloomFilter;
use crate::events::{EventBus, MeshEvent};
use crate::gossip::GossipState;
use crate::outbox::{build_message_packets, frame_payload};
use crate::radio::{Radio, RadioEvent};
use crate::{relay, time, MeshError, Result};

/// Everything guarded by the process-wide lock.
pub struct CoreState {
    /// The durable store.
    pub conn: Connection,
    /// The local member and its group map.
    pub member: Member,
    /// The inbound dedup index.
    pub dedup: TtlBloomFilter,
    /// The gossip caches and schedules.
    pub gossip: GossipState,
    /// Frames that failed to parse since startup.
    pub malformed_count: u64,
}

/// The mesh core: dispatcher plus handles to the collaborators.
#[derive(Clone)]
pub struct Core {
    state: Arc<Mutex<CoreState>>,
    radio: Arc<dyn Radio>,
    config: Arc<MeshConfig>,
    events: EventBus,
}

impl Core {
    /// Assemble a core. Wiring happens once at process start.
    pub fn new(
        conn: Connection,
        member: Member,
        config: MeshConfig,
        radio: Arc<dyn Radio>,
    ) -> Self {
        let dedup = TtlBloomFilter::new(
            config.dedup.capacity,
            config.dedup.false_positive_rate,
            config.dedup_ttl_ms(),
        );
        let gossip = GossipState::new(&config.gossip);
        Self {
            state: Arc::new(Mutex::new(CoreState {
                conn,
                member,
                dedup,
                gossip,
                malformed_count: 0,
            })),
            radio,
            config: Arc::new(config),
            events: EventBus::default(),
        }
    }

    /// The shared state handle (periodic tasks lock through this).
    pub fn state(&self) -> &Arc<Mutex<CoreState>> {
        &self.state
    }

    /// The radio handle.
    pub fn radio(&self) -> &Arc<dyn Radio> {
        &self.radio
    }

    /// The configuration.
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Consume one radio callback.
    pub async fn handle_radio_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::PeripheralWrite { bytes, device_uuid }
            | RadioEvent::CentralNotification { bytes, device_uuid } => {
                self.handle_inbound(&bytes, &device_uuid).await;
            }
            RadioEvent::PeripheralConnected { device_uuid, rssi }
            | RadioEvent::CentralSubscribed { device_uuid, rssi } => {
                let mut state = self.state.lock().await;
                let now = time::now_ms();
                if let Err(e) = devices_q::mark_connected(&state.conn, &device_uuid, rssi, now) {
                    tracing::warn!(error = %e, "failed to record peer connection");
                }
                state.gossip.on_peer_connected(now, &self.config.gossip);
                self.events.emit(MeshEvent::PeerConnected { device_uuid });
            }
            RadioEvent::PeripheralDisconnected { device_uuid } => {
                let state = self.state.lock().await;
                if let Err(e) =
                    devices_q::mark_disconnected(&state.conn, &device_uuid, time::now_ms())
                {
                    tracing::warn!(error = %e, "failed to record peer disconnect");
                }
                self.events.emit(MeshEvent::PeerDisconnected { device_uuid });
            }
            RadioEvent::RssiRead { device_uuid, rssi } => {
                let state = self.state.lock().await;
                if let Err(e) =
                    devices_q::record_rssi(&state.conn, &device_uuid, rssi, time::now_ms())
                {
                    tracing::warn!(error = %e, "failed to record rssi");
                }
            }
        }
    }

    /// Process one raw inbound frame end-to-end. Never propagates a
    /// per-packet error to the caller.
    pub async fn handle_inbound(&self, bytes: &[u8], device_uuid: &str) {
        let mut state = self.state.lock().await;
        let now = time::now_ms();

        let fingerprint = packet::fingerprint(bytes);
        if state.dedup.has(&fingerprint) {
            tracing::trace!(device_uuid, "duplicate frame dropped");
            return;
        }
        state.dedup.add(&fingerprint, now);

        let packet = match Packet::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                state.malformed_count += 1;
                tracing::debug!(
                    error = %e,
                    total = state.malformed_count,
                    "malformed frame dropped"
                );
                return;
            }
        };

        if packet.packet_type.relayable() && packet.allowed_hops > 0 {
            if let Err(e) = relay::enqueue(&state.conn, &packet, device_uuid, &self.config, now) {
                tracing::warn!(error = %e, "relay enqueue failed");
            }
        }
        state.gossip.record(&packet, now);

        if let Err(e) = self.dispatch(&mut state, packet, device_uuid, now).await {
            tracing::warn!(error = %e, device_uuid, "packet handler failed");
        }

        if let Err(e) = relay::flush(&state.conn, self.radio.as_ref(), &self.config).await {
            tracing::warn!(error = %e, "relay flush failed");
        }
    }

    /// Route a decoded packet to its typed handler. Reassembled
    /// fragments loop back in as their inner type.
    async fn dispatch(
        &self,
        state: &mut CoreState,
        packet: Packet,
        device_uuid: &str,
        now_ms: i64,
    ) -> Result<()> {
        let mut current = packet;
        loop {
            match current.packet_type {
                PacketType::Fragment => {
                    match self.handle_fragment(state, &current, now_ms)? {
                        Some((inner_type, data)) => {
                            current = Packet {
                                version: PACKET_VERSION,
                                packet_type: inner_type,
                                timestamp: current.timestamp,
                                allowed_hops: 0,
                                payload: data,
                            };
                            continue;
                        }
                        None => return Ok(()),
                    }
                }
                PacketType::AmigoWelcome => {
                    return self.handle_welcome(state, &current.payload, now_ms).await;
                }
                PacketType::AmigoPathUpdate => {
                    return self.handle_path_update(state, &current.payload, now_ms).await;
                }
                PacketType::Message => {
                    return self.handle_message(state, &current.payload, now_ms).await;
                }
                PacketType::DeliveryAck => {
                    return self.handle_ack(state, &current.payload);
                }
                PacketType::Announce => {
                    return self.handle_announce(state, &current.payload, now_ms);
                }
                PacketType::Leave => {
                    return self.handle_leave(state, &current.payload);
                }
                PacketType::Sync => {
                    return self.handle_sync(state, &current.payload, device_uuid).await;
                }
                PacketType::FileTransfer | PacketType::ReadReceipt => {
                    tracing::debug!(packet_type = ?current.packet_type, "reserved type dropped");
                    return Ok(());
                }
            }
        }
    }

    /// Stage a fragment; when its group completes, reassemble and hand
    /// back the inner payload.
    fn handle_fragment(
        &self,
        state: &mut CoreState,
        packet: &Packet,
        now_ms: i64,
    ) -> Result<Option<(PacketType, Vec<u8>)>> {
        let fragment = Fragment::from_bytes(&packet.payload)?;
        fragments_q::insert(
            &state.conn,
            &fragment.fragment_id,
            fragment.index,
            packet.version,
            fragment.fragment_type.to_wire(),
            packet.timestamp,
            &packet.payload,
            packet.allowed_hops,
            now_ms,
        )?;

        let staged = fragments_q::count_group(&state.conn, &fragment.fragment_id)?;
        if staged < fragment.total as i64 {
            return Ok(None);
        }

        let rows = fragments_q::list_group(&state.conn, &fragment.fragment_id)?;
        let mut fragments = Vec::with_capacity(rows.len());
        for row in &rows {
            match Fragment::from_bytes(&row.payload) {
                Ok(parsed) => fragments.push(parsed),
                Err(e) => {
                    tracing::warn!(error = %e, "corrupt staged fragment, dropping group");
                    fragments_q::delete_group(&state.conn, &fragment.fragment_id)?;
                    return Ok(None);
                }
            }
        }

        match amigo_wire::fragment::reassemble(&fragments) {
            Ok(assembled) => {
                fragments_q::delete_group(&state.conn, &fragment.fragment_id)?;
                tracing::debug!(
                    fragment_id = hex::encode(assembled.fragment_id),
                    size = assembled.data.len(),
                    "fragment group reassembled"
                );
                Ok(Some((assembled.fragment_type.packet_type(), assembled.data)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "fragment group mismatch, dropping group");
                fragments_q::delete_group(&state.conn, &fragment.fragment_id)?;
                Ok(None)
            }
        }
    }

    async fn handle_welcome(
        &self,
        state: &mut CoreState,
        payload: &[u8],
        now_ms: i64,
    ) -> Result<()> {
        let welcome: Welcome = codec::from_slice(payload)?;
        let group_hex = group_id_hex(&welcome.group_id);

        match state.member.process_welcome(&welcome) {
            Ok(true) => {
                let group = Group {
                    id: group_hex.clone(),
                    name: welcome.group_name.clone().unwrap_or_else(|| group_hex.clone()),
                    admin: None,
                    expandable: welcome.expandable,
                    last_active_at: now_ms,
                };
                groups_q::upsert(&state.conn, &group, now_ms)?;
                tracing::info!(group_id = group_hex, "joined group via welcome");
                self.events.emit(MeshEvent::GroupJoined {
                    group_id: group_hex,
                });
                self.drain_pending(state, now_ms).await?;
                Ok(())
            }
            Ok(false) => {
                tracing::debug!(group_id = group_hex, "welcome for a group we already hold");
                Ok(())
            }
            Err(CgkaError::Decrypt(_)) => {
                // Sealed to someone else.
                tracing::trace!(group_id = group_hex, "welcome not addressed to us");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_path_update(
        &self,
        state: &mut CoreState,
        payload: &[u8],
        now_ms: i64,
    ) -> Result<()> {
        let update: PathUpdate = codec::from_slice(payload)?;
        let group_hex = group_id_hex(&update.group_id);
        let committer_hex = hex::encode(update.committer_id);

        match state.member.process_path_update(&update) {
            Ok(PathOutcome::Advanced) => {
                groups_q::touch(&state.conn, &group_hex, now_ms)?;
                // The committer provably advanced; their control rows are done.
                control_q::retire_for_recipient(&state.conn, &committer_hex)?;
                self.events.emit(MeshEvent::EpochAdvanced {
                    group_id: group_hex,
                    epoch: update.epoch,
                });
                self.drain_pending(state, now_ms).await?;
                Ok(())
            }
            Ok(PathOutcome::Duplicate) => {
                tracing::debug!(group_id = group_hex, epoch = update.epoch, "duplicate commit");
                Ok(())
            }
            Err(CgkaError::StateMissing(_)) => {
                // Path updates require base state; no buffer for them.
                tracing::debug!(group_id = group_hex, "path update without base state");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_message(
        &self,
        state: &mut CoreState,
        payload: &[u8],
        now_ms: i64,
    ) -> Result<()> {
        let ciphertext: CgkaCiphertext = codec::from_slice(payload)?;
        let sender_hex = hex::encode(ciphertext.sender_id);

        match state.member.decrypt(&ciphertext) {
            Ok(plain) => {
                let message = payload::decode_message(&plain)?;
                self.store_decrypted(state, message, now_ms).await?;
                // Application traffic from the sender proves their state.
                control_q::retire_for_recipient(&state.conn, &sender_hex)?;
                Ok(())
            }
            Err(CgkaError::StateMissing(_)) => {
                let hash = amigo_crypto::blake3::hash(payload);
                let inserted = pending_q::insert(&state.conn, payload, &hash, now_ms)?;
                tracing::debug!(
                    sender = sender_hex,
                    buffered = inserted,
                    "message before key material, buffered"
                );
                Ok(())
            }
            Err(CgkaError::StaleEpoch { .. })
            | Err(CgkaError::WrongGroup(_))
            | Err(CgkaError::Decrypt(_)) => {
                tracing::debug!(sender = sender_hex, "undecryptable message dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a decrypted message and fire its side effects: group
    /// activity, the delivery ack (immediate broadcast plus the durable
    /// retry row), and the received event. Replays are no-ops.
    async fn store_decrypted(
        &self,
        state: &mut CoreState,
        message: ChatMessage,
        now_ms: i64,
    ) -> Result<()> {
        if !messages_q::insert(&state.conn, &message, now_ms)? {
            tracing::debug!(message_id = message.id, "duplicate message, effects skipped");
            return Ok(());
        }
        groups_q::touch(&state.conn, &message.group_id, now_ms)?;

        if message.sender != state.member.member_id_hex() {
            let ack = AckPayload {
                message_id: message.id.clone(),
                sender_verification_key: message.sender.clone(),
                timestamp: now_ms,
            };
            acks_q::insert(
                &state.conn,
                &PendingDeliveryAck {
                    message_id: message.id.clone(),
                    recipient_verification_key: message.sender.clone(),
                    retry_count: 0,
                    last_retry_at: None,
                    created_at: now_ms,
                },
            )?;
            let packet = Packet::new(
                PacketType::DeliveryAck,
                now_ms,
                self.config.ble.default_allowed_hops,
                payload::encode_ack(&ack),
            )?;
            self.radio.broadcast_packet(&packet.to_bytes(), &[]).await?;
        }

        tracing::info!(
            message_id = message.id,
            group_id = message.group_id,
            "message stored"
        );
        self.events.emit(MeshEvent::MessageReceived(message));
        Ok(())
    }

    fn handle_ack(&self, state: &mut CoreState, payload: &[u8]) -> Result<()> {
        let ack = payload::decode_ack(payload)?;
        if ack.sender_verification_key != state.member.member_id_hex() {
            // Someone else's receipt; the relay path already forwarded it.
            return Ok(());
        }
        if outbox_q::retire(&state.conn, &ack.message_id)? {
            tracing::info!(message_id = ack.message_id, "delivery confirmed");
            self.events.emit(MeshEvent::MessageDelivered {
                message_id: ack.message_id,
            });
        }
        Ok(())
    }

    fn handle_announce(
        &self,
        state: &mut CoreState,
        payload: &[u8],
        now_ms: i64,
    ) -> Result<()> {
        let announce = payload::decode_announce(payload)?;
        if announce.credential.verify().is_err() {
            tracing::debug!("announce with bad credential dropped");
            return Ok(());
        }
        if announce.credential.verification_key == state.member.member_id_hex() {
            return Ok(());
        }
        contacts_q::upsert(&state.conn, &announce.credential, now_ms)?;
        Ok(())
    }

    fn handle_leave(&self, state: &mut CoreState, payload: &[u8]) -> Result<()> {
        // A leave carries the departing peer's announce payload.
        if let Ok(announce) = payload::decode_announce(payload) {
            state
                .gossip
                .forget_peer(&announce.credential.verification_key);
            tracing::debug!(
                peer = announce.credential.verification_key,
                "peer announced departure"
            );
        }
        Ok(())
    }

    async fn handle_sync(
        &self,
        state: &mut CoreState,
        payload: &[u8],
        device_uuid: &str,
    ) -> Result<()> {
        let request = SyncPayload::from_bytes(payload)?;
        let served = state.gossip.serve(&request)?;
        tracing::debug!(device_uuid, count = served.len(), "serving sync request");
        for packet in served {
            self.radio
                .direct_broadcast(&packet.to_bytes(), device_uuid)
                .await?;
        }
        Ok(())
    }

    /// Retry every buffered ciphertext against the current group map,
    /// oldest first. Decrypted entries store-and-delete; the rest stay.
    pub async fn drain_pending(&self, state: &mut CoreState, now_ms: i64) -> Result<()> {
        let rows = pending_q::list_oldest_first(&state.conn)?;
        for row in rows {
            let ciphertext: CgkaCiphertext = match codec::from_slice(&row.encrypted_payload) {
                Ok(ciphertext) => ciphertext,
                Err(_) => {
                    pending_q::remove(&state.conn, row.id)?;
                    continue;
                }
            };
            match state.member.decrypt(&ciphertext) {
                Ok(plain) => {
                    let message = payload::decode_message(&plain)?;
                    self.store_decrypted(state, message, now_ms).await?;
                    pending_q::remove(&state.conn, row.id)?;
                }
                Err(CgkaError::StateMissing(_)) | Err(CgkaError::StaleEpoch { .. }) => {}
                Err(CgkaError::Decrypt(_)) | Err(CgkaError::WrongGroup(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Send an application message to a group: persist it, queue it for
    /// retry, and broadcast the first transmission.
    pub async fn send_message(&self, group_id: &str, contents: &str) -> Result<ChatMessage> {
        let mut state = self.state.lock().await;
        let now = time::now_ms();

        let gid = group_id_bytes(group_id)
            .map_err(|_| MeshError::UnknownGroup(group_id.to_string()))?;
        if !state.member.has_group(&gid) {
            return Err(MeshError::UnknownGroup(group_id.to_string()));
        }

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            sender: state.member.member_id_hex(),
            contents: contents.to_string(),
            timestamp: now,
        };

        messages_q::insert(&state.conn, &message, now)?;
        outbox_q::insert(&state.conn, &message, now)?;
        groups_q::touch(&state.conn, group_id, now)?;

        let frames = build_message_packets(&mut state.member, &self.config, &message)?;
        for frame in frames {
            // Our own traffic enters the gossip caches too, so peers
            // that missed the broadcast can request it back.
            if let Ok(packet) = Packet::from_bytes(&frame) {
                state.gossip.record(&packet, now);
            }
            self.radio.broadcast_packet(&frame, &[]).await?;
        }
        tracing::info!(message_id = message.id, group_id, "message sent");
        Ok(message)
    }

    /// Create a group with this device as admin.
    pub async fn create_group(
        &self,
        name: &str,
        capacity: u16,
        expandable: bool,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        let now = time::now_ms();

        let mut gid = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut gid);
        state.member.create_group(gid, capacity, expandable);

        let group_hex = group_id_hex(&gid);
        let group = Group {
            id: group_hex.clone(),
            name: name.to_string(),
            admin: Some(state.member.member_id_hex()),
            expandable,
            last_active_at: now,
        };
        groups_q::upsert(&state.conn, &group, now)?;
        tracing::info!(group_id = group_hex, name, "group created");
        Ok(group_hex)
    }

    /// Admit a contact to a group: broadcast the welcome and path
    /// update, and queue both for retry until the state advance shows.
    pub async fn invite_contact(&self, contact: &Credential, group_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = time::now_ms();

        let gid = group_id_bytes(group_id)
            .map_err(|_| MeshError::UnknownGroup(group_id.to_string()))?;
        let group_name = groups_q::get(&state.conn, group_id).map(|g| g.name).ok();

        let (welcome, update) =
            state
                .member
                .welcome_contact(contact, &gid, group_name)?;
        let welcome_bytes = codec::to_vec(&welcome)?;
        let update_bytes = codec::to_vec(&update)?;

        // Track the newcomer as a contact and member.
        let contact_id = contacts_q::upsert(&state.conn, contact, now)?;
        groups_q::add_member(&state.conn, group_id, contact_id)?;
        groups_q::touch(&state.conn, group_id, now)?;

        // Control rows: the welcome for the newcomer, the path update
        // for every member who must advance to the new epoch.
        let me = state.member.member_id();
        let newcomer: [u8; 32] = contact
            .verifying_key()
            .map_err(|e| MeshError::Cgka(CgkaError::Credential(e.to_string())))?
            .to_bytes();
        control_q::insert(
            &state.conn,
            &OutgoingControlMessage {
                id: uuid::Uuid::new_v4().to_string(),
                packet_type: ControlPacketType::Welcome,
                payload_base64: base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    &welcome_bytes,
                ),
                recipient_verification_key: contact.verification_key.clone(),
                retry_count: 0,
                last_retry_at: None,
                created_at: now,
            },
        )?;
        for member_id in welcome
            .member_ids
            .iter()
            .filter(|id| **id != me && **id != newcomer)
        {
            control_q::insert(
                &state.conn,
                &OutgoingControlMessage {
                    id: uuid::Uuid::new_v4().to_string(),
                    packet_type: ControlPacketType::PathUpdate,
                    payload_base64: base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        &update_bytes,
                    ),
                    recipient_verification_key: hex::encode(member_id),
                    retry_count: 0,
                    last_retry_at: None,
                    created_at: now,
                },
            )?;
        }

        for frame in frame_payload(PacketType::AmigoWelcome, welcome_bytes, now, &self.config)? {
            self.radio.broadcast_packet(&frame, &[]).await?;
        }
        for frame in frame_payload(PacketType::AmigoPathUpdate, update_bytes, now, &self.config)? {
            self.radio.broadcast_packet(&frame, &[]).await?;
        }

        tracing::info!(
            group_id,
            contact = contact.verification_key,
            "contact invited"
        );
        Ok(())
    }

    /// Broadcast this device's presence.
    pub async fn announce_presence(&self) -> Result<()> {
        let state = self.state.lock().await;
        let now = time::now_ms();
        let announce = AnnouncePayload {
            credential: state.member.credential().clone(),
            timestamp: now,
        };
        let packet = Packet::new(
            PacketType::Announce,
            now,
            self.config.ble.default_allowed_hops,
            payload::encode_announce(&announce),
        )?;
        self.radio.broadcast_packet(&packet.to_bytes(), &[]).await?;
        Ok(())
    }

    /// Replace the dedup index from a persisted snapshot, pruning
    /// entries that expired while the process was down.
    pub async fn restore_dedup(&self, snapshot_json: &str, now_ms: i64) -> Result<()> {
        let restored = TtlBloomFilter::restore(snapshot_json, now_ms)?;
        let mut state = self.state.lock().await;
        state.dedup = restored;
        Ok(())
    }

    /// Seal the member (keys, credential, group states) for the secret
    /// store.
    pub async fn seal_member(&self, device_secret: &[u8; 32]) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        Ok(amigo_cgka::persist::seal_member(&state.member, device_secret)?)
    }

    /// Broadcast a gossip sync request for the given kind flags.
    pub async fn send_sync_request(&self, kinds: u8) -> Result<()> {
        let state = self.state.lock().await;
        let request = state.gossip.build_request(kinds);
        // Sync exchanges are strictly link-local.
        let packet = Packet::new(PacketType::Sync, time::now_ms(), 0, request.to_bytes())?;
        self.radio.broadcast_packet(&packet.to_bytes(), &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::ChannelRadio;

    fn make_core(pseudonym: &str) -> (Core, Arc<ChannelRadio>) {
        let conn = amigo_db::open_memory().expect("db");
        let member = Member::create(pseudonym);
        let radio = Arc::new(ChannelRadio::new());
        let mut config = MeshConfig::default();
        config.relay.pacing_ms = 0;
        let core = Core::new(conn, member, config, radio.clone());
        (core, radio)
    }

    #[tokio::test]
    async fn test_malformed_frame_counted_and_dropped() {
        let (core, radio) = make_core("alice");
        core.handle_inbound(&[1, 2, 3], "dev").await;

        let state = core.state().lock().await;
        assert_eq!(state.malformed_count, 1);
        drop(state);
        assert!(radio.take_sent().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_frame_suppressed() {
        let (alice, alice_radio) = make_core("alice");
        let (bob, bob_radio) = make_core("bob");
        let group = bob.create_group("amigos", 4, true).await.expect("group");
        bob.send_message(&group, "hola").await.expect("send");
        let frame = bob_radio.take_sent()[0].bytes().to_vec();

        // First delivery: no key material yet, so the ciphertext is
        // buffered, and the packet relays onward.
        alice.handle_inbound(&frame, "dev").await;
        assert!(!alice_radio.take_sent().is_empty(), "first delivery should relay");

        // The replay is suppressed before any handler runs.
        alice.handle_inbound(&frame, "dev").await;
        assert!(alice_radio.take_sent().is_empty(), "replay had effects");

        let state = alice.state().lock().await;
        assert_eq!(pending_q::count(&state.conn).expect("count"), 1);
    }

    #[tokio::test]
    async fn test_announce_upserts_contact() {
        let (core, _radio) = make_core("alice");
        let bob = Member::create("bob");
        let announce = AnnouncePayload {
            credential: bob.credential().clone(),
            timestamp: 1000,
        };
        let packet = Packet::new(
            PacketType::Announce,
            1000,
            2,
            payload::encode_announce(&announce),
        )
        .expect("packet");

        core.handle_inbound(&packet.to_bytes(), "dev").await;

        let state = core.state().lock().await;
        let contact =
            contacts_q::get_by_key(&state.conn, &bob.member_id_hex()).expect("contact stored");
        assert_eq!(contact.credential.pseudonym, "bob");
    }

    #[tokio::test]
    async fn test_tampered_announce_rejected() {
        let (core, _radio) = make_core("alice");
        let bob = Member::create("bob");
        let mut credential = bob.credential().clone();
        credential.pseudonym = "mallory".to_string();
        let packet = Packet::new(
            PacketType::Announce,
            1000,
            2,
            payload::encode_announce(&AnnouncePayload {
                credential,
                timestamp: 1000,
            }),
        )
        .expect("packet");

        core.handle_inbound(&packet.to_bytes(), "dev").await;

        let state = core.state().lock().await;
        assert!(contacts_q::get_by_key(&state.conn, &bob.member_id_hex()).is_err());
    }

    #[tokio::test]
    async fn test_send_message_persists_and_broadcasts() {
        let (core, radio) = make_core("alice");
        let group = core.create_group("amigos", 4, true).await.expect("group");

        let message = core.send_message(&group, "hola").await.expect("send");

        let state = core.state().lock().await;
        assert!(messages_q::exists(&state.conn, &message.id).expect("exists"));
        assert_eq!(outbox_q::count(&state.conn).expect("count"), 1);
        drop(state);

        let sent = radio.take_sent();
        assert_eq!(sent.len(), 1);
        let packet = Packet::from_bytes(sent[0].bytes()).expect("decode");
        assert_eq!(packet.packet_type, PacketType::Message);
    }

    #[tokio::test]
    async fn test_send_to_unknown_group_rejected() {
        let (core, _radio) = make_core("alice");
        let result = core.send_message(&hex::encode([9u8; 16]), "hola").await;
        assert!(matches!(result, Err(MeshError::UnknownGroup(_))));
    }

    #[tokio::test]
    async fn test_sync_packet_never_relayed() {
        let (core, radio) = make_core("alice");
        // A sync frame with a nonzero hop budget is still not relayed.
        let request = SyncPayload {
            kinds: 0,
            filter: crate::bloom::BloomFilter::optimal(1, 0.01).to_bytes(),
        };
        let packet = Packet::new(PacketType::Sync, 1000, 3, request.to_bytes()).expect("packet");

        core.handle_inbound(&packet.to_bytes(), "dev").await;

        for transmission in radio.take_sent() {
            let sent = Packet::from_bytes(transmission.bytes()).expect("decode");
            assert_ne!(sent.packet_type, PacketType::Sync, "sync was re-broadcast");
        }
        let state = core.state().lock().await;
        assert_eq!(
            amigo_db::queries::relay::count(&state.conn).expect("count"),
            0
        );
    }
}
