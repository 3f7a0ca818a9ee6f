//! Gossip reconciliation.
//!
//! Peers that were offline for each other converge by exchanging bloom
//! filters: a `RequestSync` carries a filter of the packet ids the
//! sender already holds, and the receiver unicasts back whatever the
//! filter lacks. Three bounded FIFO caches feed this exchange — messages,
//! fragments, and announcements — keyed by the 16-byte deterministic
//! packet id.
//!
//! Sync packets themselves never relay (`allowed_hops = 0` always) and
//! served packets go out the same way; the requester's normal inbound
//! path re-applies dedup.

use std::collections::{HashMap, VecDeque};

use amigo_cgka::codec;
use amigo_cgka::group::CgkaCiphertext;
use amigo_wire::packet::{Packet, PacketType};
use amigo_wire::payload;
use amigo_wire::sync::{SyncPayload, KIND_ANNOUNCE, KIND_FRAGMENT, KIND_MESSAGE};

use crate::bloom::BloomFilter;
use crate::config::GossipConfig;
use crate::Result;

/// Target false-positive rate for sync filters.
const SYNC_FILTER_FPR: f64 = 0.01;

/// A bounded FIFO cache of packets keyed by packet id.
pub struct PacketCache {
    capacity: usize,
    order: VecDeque<[u8; 16]>,
    packets: HashMap<[u8; 16], Packet>,
}

impl PacketCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            packets: HashMap::new(),
        }
    }

    /// Insert a packet. Returns `false` if its id is already cached.
    /// Beyond capacity the oldest entry is evicted.
    pub fn insert(&mut self, packet: Packet) -> bool {
        let id = packet.packet_id();
        if self.packets.contains_key(&id) {
            return false;
        }
        self.packets.insert(id, packet);
        self.order.push_back(id);
        while self.packets.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.packets.remove(&oldest);
            }
        }
        true
    }

    /// Evict packets older than the cutoff. Returns the number removed.
    pub fn evict_older_than(&mut self, cutoff_ms: i64) -> usize {
        let before = self.packets.len();
        self.packets.retain(|_, packet| packet.timestamp >= cutoff_ms);
        self.order.retain(|id| self.packets.contains_key(id));
        before - self.packets.len()
    }

    /// Remove packets matching a predicate. Returns the number removed.
    fn remove_where<F: Fn(&Packet) -> bool>(&mut self, predicate: F) -> usize {
        let before = self.packets.len();
        self.packets.retain(|_, packet| !predicate(packet));
        self.order.retain(|id| self.packets.contains_key(id));
        before - self.packets.len()
    }

    /// Cached packet count.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn ids(&self) -> impl Iterator<Item = &[u8; 16]> {
        self.packets.keys()
    }

    fn values(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }
}

/// A sync request that became due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueSync {
    /// The kind flags to request.
    pub kinds: u8,
}

struct InitialSync {
    kinds: u8,
    due_ms: i64,
}

/// Gossip state: the three caches, peer liveness, and sync schedules.
pub struct GossipState {
    messages: PacketCache,
    fragments: PacketCache,
    announcements: PacketCache,
    /// Verification key (hex) -> last announce timestamp.
    peers: HashMap<String, i64>,
    last_message_sync_ms: Option<i64>,
    last_fragment_sync_ms: Option<i64>,
    initial: Vec<InitialSync>,
}

impl GossipState {
    /// Create empty state sized from the configuration.
    pub fn new(config: &GossipConfig) -> Self {
        Self {
            messages: PacketCache::new(config.seen_capacity),
            fragments: PacketCache::new(config.fragment_capacity),
            announcements: PacketCache::new(config.seen_capacity),
            peers: HashMap::new(),
            last_message_sync_ms: None,
            last_fragment_sync_ms: None,
            initial: Vec::new(),
        }
    }

    /// Record an inbound packet into the cache its type belongs to.
    /// Announces also refresh the sender's liveness.
    pub fn record(&mut self, packet: &Packet, now_ms: i64) {
        match packet.packet_type {
            PacketType::Message => {
                self.messages.insert(packet.clone());
            }
            PacketType::Fragment => {
                self.fragments.insert(packet.clone());
            }
            PacketType::Announce => {
                if let Ok(announce) = payload::decode_announce(&packet.payload) {
                    self.peers
                        .insert(announce.credential.verification_key.clone(), now_ms);
                }
                self.announcements.insert(packet.clone());
            }
            _ => {}
        }
    }

    /// Forget a peer announced as departed.
    pub fn forget_peer(&mut self, verification_key: &str) {
        self.peers.remove(verification_key);
    }

    /// Build a `RequestSync` payload: the kind flags plus a bloom filter
    /// over every cached id of those kinds.
    pub fn build_request(&self, kinds: u8) -> SyncPayload {
        let mut count = 0;
        if kinds & KIND_ANNOUNCE != 0 {
            count += self.announcements.len();
        }
        if kinds & KIND_MESSAGE != 0 {
            count += self.messages.len();
        }
        if kinds & KIND_FRAGMENT != 0 {
            count += self.fragments.len();
        }

        let mut filter = BloomFilter::optimal(count.max(1), SYNC_FILTER_FPR);
        let mut add_ids = |cache: &PacketCache| {
            for id in cache.ids() {
                filter.insert(id);
            }
        };
        if kinds & KIND_ANNOUNCE != 0 {
            add_ids(&self.announcements);
        }
        if kinds & KIND_MESSAGE != 0 {
            add_ids(&self.messages);
        }
        if kinds & KIND_FRAGMENT != 0 {
            add_ids(&self.fragments);
        }

        SyncPayload {
            kinds,
            filter: filter.to_bytes(),
        }
    }

    /// Serve a peer's request: every cached packet of a requested kind
    /// whose id the peer's filter lacks, hop budget zeroed for the
    /// direct send.
    pub fn serve(&self, request: &SyncPayload) -> Result<Vec<Packet>> {
        let filter = BloomFilter::from_bytes(&request.filter)?;
        let mut out = Vec::new();

        let serve_cache = |cache: &PacketCache, out: &mut Vec<Packet>| {
            for packet in cache.values() {
                if !filter.contains(&packet.packet_id()) {
                    let mut served = packet.clone();
                    served.allowed_hops = 0;
                    out.push(served);
                }
            }
        };
        if request.wants(KIND_ANNOUNCE) {
            serve_cache(&self.announcements, &mut out);
        }
        if request.wants(KIND_MESSAGE) {
            serve_cache(&self.messages, &mut out);
        }
        if request.wants(KIND_FRAGMENT) {
            serve_cache(&self.fragments, &mut out);
        }
        Ok(out)
    }

    /// Maintenance pass: evict aged packets and return the sync requests
    /// whose schedule came due.
    pub fn maintenance(&mut self, now_ms: i64, config: &GossipConfig) -> Vec<DueSync> {
        let cutoff = now_ms - config.max_message_age_seconds as i64 * 1000;
        self.messages.evict_older_than(cutoff);
        self.fragments.evict_older_than(cutoff);
        self.announcements.evict_older_than(cutoff);

        let mut due = Vec::new();
        let message_interval = config.message_sync_interval_seconds as i64 * 1000;
        if self
            .last_message_sync_ms
            .map_or(true, |last| now_ms - last >= message_interval)
        {
            self.last_message_sync_ms = Some(now_ms);
            due.push(DueSync {
                kinds: KIND_ANNOUNCE | KIND_MESSAGE,
            });
        }

        let fragment_interval = config.fragment_sync_interval_seconds as i64 * 1000;
        if self
            .last_fragment_sync_ms
            .map_or(true, |last| now_ms - last >= fragment_interval)
        {
            self.last_fragment_sync_ms = Some(now_ms);
            due.push(DueSync {
                kinds: KIND_FRAGMENT,
            });
        }

        due
    }

    /// Schedule the initial syncs for a freshly connected peer: messages
    /// after the configured delay, fragments shortly after.
    pub fn on_peer_connected(&mut self, now_ms: i64, config: &GossipConfig) {
        let message_due = now_ms + config.initial_sync_delay_ms as i64;
        self.initial.push(InitialSync {
            kinds: KIND_ANNOUNCE | KIND_MESSAGE,
            due_ms: message_due,
        });
        self.initial.push(InitialSync {
            kinds: KIND_FRAGMENT,
            due_ms: message_due + config.initial_fragment_sync_extra_ms as i64,
        });
    }

    /// Drain initial syncs that came due.
    pub fn due_initial_syncs(&mut self, now_ms: i64) -> Vec<DueSync> {
        let mut due = Vec::new();
        self.initial.retain(|sync| {
            if sync.due_ms <= now_ms {
                due.push(DueSync { kinds: sync.kinds });
                false
            } else {
                true
            }
        });
        due
    }

    /// Remove peers whose last announce aged past the timeout, their
    /// announcements, and the cached messages attributable to them.
    /// Fragments carry no sender and age out by the maintenance pass
    /// instead. Returns the number of peers removed.
    pub fn stale_peer_cleanup(&mut self, now_ms: i64, timeout_ms: i64) -> usize {
        let stale: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, &last)| now_ms - last > timeout_ms)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            self.peers.remove(key);
        }
        if stale.is_empty() {
            return 0;
        }

        self.announcements.remove_where(|packet| {
            extract_sender(packet)
                .map(|sender| stale.contains(&sender))
                .unwrap_or(false)
        });
        self.messages.remove_where(|packet| {
            extract_sender(packet)
                .map(|sender| stale.contains(&sender))
                .unwrap_or(false)
        });

        stale.len()
    }

    /// Cached message count (for tests and diagnostics).
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Cached fragment count.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Cached announcement count.
    pub fn announcement_count(&self) -> usize {
        self.announcements.len()
    }

    /// Tracked peer count.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Read the verified-sender identity out of a packet, where the payload
/// carries one: the credential in an announce, the clear `sender_id` of
/// a group ciphertext. Fragments and everything else yield `None`.
pub fn extract_sender(packet: &Packet) -> Option<String> {
    match packet.packet_type {
        PacketType::Announce => payload::decode_announce(&packet.payload)
            .ok()
            .map(|announce| announce.credential.verification_key),
        PacketType::Message => codec::from_slice::<CgkaCiphertext>(&packet.payload)
            .ok()
            .map(|ciphertext| hex::encode(ciphertext.sender_id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amigo_crypto::ed25519::Keypair;
    use amigo_crypto::x25519::EcdhSecret;
    use amigo_types::Credential;
    use amigo_wire::payload::AnnouncePayload;

    fn test_config() -> GossipConfig {
        GossipConfig::default()
    }

    fn message_packet(seed: u8, timestamp: i64) -> Packet {
        Packet::new(PacketType::Message, timestamp, 3, vec![seed; 8]).expect("packet")
    }

    fn announce_packet(pseudonym: &str, timestamp: i64) -> (Packet, String) {
        let keypair = Keypair::generate();
        let ecdh = EcdhSecret::generate();
        let credential = Credential::issue(&keypair, pseudonym, &ecdh.public_key());
        let key = credential.verification_key.clone();
        let bytes = payload::encode_announce(&AnnouncePayload {
            credential,
            timestamp,
        });
        (
            Packet::new(PacketType::Announce, timestamp, 3, bytes).expect("packet"),
            key,
        )
    }

    #[test]
    fn test_record_dedupes_by_packet_id() {
        let mut gossip = GossipState::new(&test_config());
        let packet = message_packet(1, 1000);
        gossip.record(&packet, 1000);
        gossip.record(&packet, 2000);
        assert_eq!(gossip.message_count(), 1);
    }

    #[test]
    fn test_cache_fifo_eviction() {
        let mut cache = PacketCache::new(3);
        for i in 0..5u8 {
            cache.insert(message_packet(i, 1000 + i as i64));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_request_serve_exchange() {
        let config = test_config();
        let mut alice = GossipState::new(&config);
        let mut bob = GossipState::new(&config);

        let shared = message_packet(1, 1000);
        let missing = message_packet(2, 1001);
        alice.record(&shared, 1000);
        alice.record(&missing, 1001);
        bob.record(&shared, 1000);

        let request = bob.build_request(KIND_MESSAGE);
        let served = alice.serve(&request).expect("serve");

        assert_eq!(served.len(), 1);
        assert_eq!(served[0].payload, missing.payload);
        assert_eq!(served[0].allowed_hops, 0);
    }

    #[test]
    fn test_serve_nothing_when_peer_has_all() {
        let config = test_config();
        let mut alice = GossipState::new(&config);
        let mut bob = GossipState::new(&config);

        let packet = message_packet(1, 1000);
        alice.record(&packet, 1000);
        bob.record(&packet, 1000);

        let served = alice.serve(&bob.build_request(KIND_MESSAGE)).expect("serve");
        assert!(served.is_empty());
    }

    #[test]
    fn test_maintenance_evicts_aged_packets() {
        let config = test_config();
        let mut gossip = GossipState::new(&config);
        gossip.record(&message_packet(1, 1000), 1000);

        let later = 1000 + config.max_message_age_seconds as i64 * 1000 + 1;
        gossip.maintenance(later, &config);
        assert_eq!(gossip.message_count(), 0);
    }

    #[test]
    fn test_sync_schedules() {
        let config = test_config();
        let mut gossip = GossipState::new(&config);

        // First pass fires both schedules.
        let due = gossip.maintenance(0, &config);
        assert_eq!(due.len(), 2);

        // Immediately after, nothing is due.
        assert!(gossip.maintenance(1, &config).is_empty());

        // Message schedule (15s) fires alone at 15s.
        let due = gossip.maintenance(15_000, &config);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kinds & KIND_MESSAGE, KIND_MESSAGE);

        // At 30s the fragment schedule fires too.
        let due = gossip.maintenance(30_000, &config);
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn test_initial_syncs_fire_in_order() {
        let config = test_config();
        let mut gossip = GossipState::new(&config);
        gossip.on_peer_connected(0, &config);

        assert!(gossip.due_initial_syncs(4999).is_empty());

        let due = gossip.due_initial_syncs(5000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kinds & KIND_MESSAGE, KIND_MESSAGE);

        let due = gossip.due_initial_syncs(5500);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kinds, KIND_FRAGMENT);
    }

    #[test]
    fn test_stale_peer_cleanup_purges_their_packets() {
        let config = test_config();
        let mut gossip = GossipState::new(&config);

        let (announce, _key) = announce_packet("alice", 1000);
        gossip.record(&announce, 1000);
        assert_eq!(gossip.peer_count(), 1);
        assert_eq!(gossip.announcement_count(), 1);

        let removed = gossip.stale_peer_cleanup(1000 + 61_000, 60_000);
        assert_eq!(removed, 1);
        assert_eq!(gossip.peer_count(), 0);
        assert_eq!(gossip.announcement_count(), 0);
    }

    #[test]
    fn test_live_peer_survives_cleanup() {
        let config = test_config();
        let mut gossip = GossipState::new(&config);
        let (announce, _key) = announce_packet("alice", 1000);
        gossip.record(&announce, 50_000);

        assert_eq!(gossip.stale_peer_cleanup(60_000, 60_000), 0);
        assert_eq!(gossip.peer_count(), 1);
    }

    #[test]
    fn test_extract_sender_from_announce() {
        let (announce, key) = announce_packet("alice", 1000);
        assert_eq!(extract_sender(&announce), Some(key));
    }

    #[test]
    fn test_extract_sender_from_fragment_is_none() {
        let packet = Packet::new(PacketType::Fragment, 1000, 3, vec![0; 20]).expect("packet");
        assert_eq!(extract_sender(&packet), None);
    }
}
