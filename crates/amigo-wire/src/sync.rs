//! The gossip `RequestSync` payload.
//!
//! Layout: `kinds (1) || filter bytes`. The kinds byte is a flag set of
//! the stores the requester wants served; the filter bytes are the
//! requester's serialized bloom filter of packet ids it already holds
//! (the filter format itself belongs to the gossip layer — this codec
//! treats it as opaque).

use crate::{Result, WireError};

/// Flag: serve announcement packets.
pub const KIND_ANNOUNCE: u8 = 1;
/// Flag: serve message packets.
pub const KIND_MESSAGE: u8 = 2;
/// Flag: serve fragment packets.
pub const KIND_FRAGMENT: u8 = 4;

/// A gossip reconciliation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPayload {
    /// Flag set of requested stores.
    pub kinds: u8,
    /// Serialized bloom filter of held packet ids.
    pub filter: Vec<u8>,
}

impl SyncPayload {
    /// Whether a kind flag is set.
    pub fn wants(&self, kind: u8) -> bool {
        self.kinds & kind != 0
    }

    /// Serialize to payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.filter.len());
        out.push(self.kinds);
        out.extend_from_slice(&self.filter);
        out
    }

    /// Parse payload bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (&kinds, filter) = data
            .split_first()
            .ok_or_else(|| WireError::MalformedPacket("empty sync payload".into()))?;
        Ok(Self {
            kinds,
            filter: filter.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let payload = SyncPayload {
            kinds: KIND_MESSAGE | KIND_FRAGMENT,
            filter: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let restored = SyncPayload::from_bytes(&payload.to_bytes()).expect("decode");
        assert_eq!(payload, restored);
    }

    #[test]
    fn test_wants_flags() {
        let payload = SyncPayload {
            kinds: KIND_MESSAGE,
            filter: Vec::new(),
        };
        assert!(payload.wants(KIND_MESSAGE));
        assert!(!payload.wants(KIND_FRAGMENT));
        assert!(!payload.wants(KIND_ANNOUNCE));
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(SyncPayload::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_empty_filter_allowed() {
        let restored = SyncPayload::from_bytes(&[KIND_ANNOUNCE]).expect("decode");
        assert!(restored.filter.is_empty());
    }
}
