//! The packet frame.
//!
//! Every radio transmission is one packet:
//!
//! ```text
//! Packet {
//!     version:      u8,     // protocol version (1)
//!     type:         u8,     // packet type registry below
//!     timestamp:    i64,    // Unix ms, big-endian
//!     allowed_hops: u8,     // 0 = do not relay
//!     payload_len:  u16,    // big-endian
//!     payload:      bytes,
//! }
//! ```
//!
//! Decoding fails if bytes run short or `payload_len` disagrees with the
//! buffer tail. The frame carries no checksum; the radio link and the
//! payload AEADs own integrity.

use crate::{Result, WireError};

/// Current protocol version.
pub const PACKET_VERSION: u8 = 1;

/// Frame header length: version + type + timestamp + hops + payload_len.
pub const HEADER_LEN: usize = 13;

/// Maximum payload length the u16 length field can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Packet type registry. Wire values are fixed in declaration order from
/// zero and must never be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Group welcome admitting a new member.
    AmigoWelcome = 0,
    /// Commit advancing a group epoch.
    AmigoPathUpdate = 1,
    /// Peer presence, carrying the sender's credential.
    Announce = 2,
    /// Group-encrypted application message.
    Message = 3,
    /// Peer departure.
    Leave = 4,
    /// Gossip bloom-filter exchange. Never relayed.
    Sync = 5,
    /// Fragment of one of the fragmentable types.
    Fragment = 6,
    /// Binary attachment (reserved).
    FileTransfer = 7,
    /// Per-message delivery receipt.
    DeliveryAck = 8,
    /// Per-message read receipt (reserved).
    ReadReceipt = 9,
}

impl PacketType {
    /// Parse a wire value.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::AmigoWelcome),
            1 => Ok(Self::AmigoPathUpdate),
            2 => Ok(Self::Announce),
            3 => Ok(Self::Message),
            4 => Ok(Self::Leave),
            5 => Ok(Self::Sync),
            6 => Ok(Self::Fragment),
            7 => Ok(Self::FileTransfer),
            8 => Ok(Self::DeliveryAck),
            9 => Ok(Self::ReadReceipt),
            other => Err(WireError::UnknownPacketType(other)),
        }
    }

    /// The wire value.
    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Whether the mesh may relay this type. Sync exchanges are strictly
    /// link-local.
    pub fn relayable(self) -> bool {
        !matches!(self, Self::Sync)
    }
}

/// One wire packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Protocol version. Must be [`PACKET_VERSION`].
    pub version: u8,
    /// Packet type.
    pub packet_type: PacketType,
    /// Unix ms at the sender.
    pub timestamp: i64,
    /// Remaining relay budget. 0 = do not relay.
    pub allowed_hops: u8,
    /// Type-specific payload bytes.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet at the current protocol version.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::PayloadTooLarge`] if the payload exceeds the
    /// u16 length field.
    pub fn new(
        packet_type: PacketType,
        timestamp: i64,
        allowed_hops: u8,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            version: PACKET_VERSION,
            packet_type,
            timestamp,
            allowed_hops,
            payload,
        })
    }

    /// Serialize to frame bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.version);
        out.push(self.packet_type.to_wire());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.push(self.allowed_hops);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse frame bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(WireError::MalformedPacket(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0];
        if version != PACKET_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let packet_type = PacketType::from_wire(data[1])?;

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[2..10]);
        let timestamp = i64::from_be_bytes(ts);

        let allowed_hops = data[10];
        let payload_len = u16::from_be_bytes([data[11], data[12]]) as usize;
        if data.len() - HEADER_LEN != payload_len {
            return Err(WireError::MalformedPacket(format!(
                "payload length {} disagrees with buffer tail {}",
                payload_len,
                data.len() - HEADER_LEN
            )));
        }

        Ok(Self {
            version,
            packet_type,
            timestamp,
            allowed_hops,
            payload: data[HEADER_LEN..].to_vec(),
        })
    }

    /// The 16-byte deterministic gossip id for this packet:
    /// `timestamp (8 BE) || type (1) || version (1) || first 6 bytes of
    /// the payload digest`.
    ///
    /// A payload prefix would not do here: all fragments of one payload
    /// share their first bytes (the fragment id), and gossip must tell
    /// them apart to serve a single missing fragment.
    pub fn packet_id(&self) -> [u8; 16] {
        let digest = amigo_crypto::blake3::hash(&self.payload);
        let mut id = [0u8; 16];
        id[..8].copy_from_slice(&self.timestamp.to_be_bytes());
        id[8] = self.packet_type.to_wire();
        id[9] = self.version;
        id[10..].copy_from_slice(&digest[..6]);
        id
    }
}

/// Dedup fingerprint of a raw frame: base64 of the exact bytes received.
pub fn fingerprint(raw: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let packet = Packet::new(PacketType::Message, 1_700_000_000_123, 3, vec![1, 2, 3])
            .expect("build packet");
        let restored = Packet::from_bytes(&packet.to_bytes()).expect("decode");
        assert_eq!(packet, restored);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let packet = Packet::new(PacketType::Leave, 0, 0, Vec::new()).expect("build packet");
        let restored = Packet::from_bytes(&packet.to_bytes()).expect("decode");
        assert_eq!(restored.payload.len(), 0);
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(matches!(
            Packet::from_bytes(&[1, 3, 0]),
            Err(WireError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_length_disagreement_rejected() {
        let packet = Packet::new(PacketType::Message, 1, 1, vec![9; 10]).expect("build packet");
        let mut bytes = packet.to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(WireError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let packet = Packet::new(PacketType::Message, 1, 1, vec![]).expect("build packet");
        let mut bytes = packet.to_bytes();
        bytes[1] = 200;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(WireError::UnknownPacketType(200))
        ));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let packet = Packet::new(PacketType::Message, 1, 1, vec![]).expect("build packet");
        let mut bytes = packet.to_bytes();
        bytes[0] = 9;
        assert!(matches!(
            Packet::from_bytes(&bytes),
            Err(WireError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_oversize_payload_rejected() {
        let result = Packet::new(PacketType::Message, 1, 1, vec![0; MAX_PAYLOAD_LEN + 1]);
        assert!(matches!(result, Err(WireError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_wire_values_fixed() {
        assert_eq!(PacketType::AmigoWelcome.to_wire(), 0);
        assert_eq!(PacketType::AmigoPathUpdate.to_wire(), 1);
        assert_eq!(PacketType::Announce.to_wire(), 2);
        assert_eq!(PacketType::Message.to_wire(), 3);
        assert_eq!(PacketType::Leave.to_wire(), 4);
        assert_eq!(PacketType::Sync.to_wire(), 5);
        assert_eq!(PacketType::Fragment.to_wire(), 6);
        assert_eq!(PacketType::FileTransfer.to_wire(), 7);
        assert_eq!(PacketType::DeliveryAck.to_wire(), 8);
        assert_eq!(PacketType::ReadReceipt.to_wire(), 9);
    }

    #[test]
    fn test_only_sync_unrelayable() {
        for value in 0..=9u8 {
            let packet_type = PacketType::from_wire(value).expect("valid type");
            assert_eq!(packet_type.relayable(), packet_type != PacketType::Sync);
        }
    }

    #[test]
    fn test_packet_id_layout() {
        let packet = Packet::new(PacketType::Message, 0x0102, 2, vec![0xAA; 8])
            .expect("build packet");
        let id = packet.packet_id();
        assert_eq!(&id[..8], &0x0102i64.to_be_bytes());
        assert_eq!(id[8], PacketType::Message.to_wire());
        assert_eq!(id[9], PACKET_VERSION);
        // Deterministic: same packet, same id.
        assert_eq!(id, packet.packet_id());
    }

    #[test]
    fn test_packet_id_distinguishes_shared_prefixes() {
        // Two payloads sharing their first bytes (as fragments of one
        // group do) must still get distinct ids.
        let a = Packet::new(PacketType::Fragment, 7, 0, vec![1, 2, 3, 4, 5, 6, 7, 8, 0])
            .expect("build packet");
        let b = Packet::new(PacketType::Fragment, 7, 0, vec![1, 2, 3, 4, 5, 6, 7, 8, 1])
            .expect("build packet");
        assert_ne!(a.packet_id(), b.packet_id());
    }

    #[test]
    fn test_fingerprint_is_base64_of_raw() {
        let packet = Packet::new(PacketType::Message, 1, 1, vec![5]).expect("build packet");
        let raw = packet.to_bytes();
        let fp = fingerprint(&raw);
        let decoded =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &fp)
                .expect("valid base64");
        assert_eq!(decoded, raw);
    }
}
