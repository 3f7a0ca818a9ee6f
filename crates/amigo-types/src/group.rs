//! Group records.
//!
//! `Group` is the durable, presentation-facing record. The cryptographic
//! group state lives in `amigo-cgka` and is keyed by the same 128-bit id.

use serde::{Deserialize, Serialize};

/// A chat group record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Hex-encoded 128-bit group id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Hex verification key of the admin, if the group has one.
    pub admin: Option<String>,
    /// Whether members beyond the founding set may be added.
    pub expandable: bool,
    /// Unix ms of the last message or membership change.
    pub last_active_at: i64,
}

/// A (group, contact) membership edge. Deleted cascading on either side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Hex-encoded group id.
    pub group_id: String,
    /// Local contact row id.
    pub contact_id: i64,
}

/// Parse a hex group id into its 16 raw bytes.
pub fn group_id_bytes(hex_id: &str) -> crate::Result<[u8; 16]> {
    let raw = hex::decode(hex_id).map_err(|e| crate::TypeError::InvalidHex(e.to_string()))?;
    raw.try_into()
        .map_err(|_| crate::TypeError::InvalidHex("group id must be 16 bytes".into()))
}

/// Hex-encode a 16-byte group id.
pub fn group_id_hex(id: &[u8; 16]) -> String {
    hex::encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_roundtrip() {
        let id = [0xABu8; 16];
        let hex_id = group_id_hex(&id);
        assert_eq!(hex_id.len(), 32);
        assert_eq!(group_id_bytes(&hex_id).expect("parse"), id);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(group_id_bytes("abcd").is_err());
        assert!(group_id_bytes("zz").is_err());
    }
}
