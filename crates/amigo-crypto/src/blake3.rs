//! Domain-separated BLAKE3 hashing and key derivation.
//!
//! BLAKE3 backs the group key schedule, the ECIES key/nonce derivation,
//! and the bloom filter index hashing. Cross-domain collisions are
//! prevented by mandatory context strings; using an unregistered context
//! string is a protocol violation.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const GROUP_EPOCH_SECRET: &str = "amigo v1 group-epoch-secret";
    pub const GROUP_MESSAGE_KEY: &str = "amigo v1 group-message-key";
    pub const GROUP_NONCE_BASE: &str = "amigo v1 group-nonce-base";
    pub const ECIES_ENCRYPTION_KEY: &str = "amigo v1 ecies-encryption-key";
    pub const ECIES_NONCE: &str = "amigo v1 ecies-nonce";
    pub const BLOOM_INDEX: &str = "amigo v1 bloom-index";
    pub const PENDING_PAYLOAD_HASH: &str = "amigo v1 pending-payload-hash";
}

/// Pure BLAKE3 hash of the input.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive a 32-byte key from key material under a registered context.
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    blake3::derive_key(context, material)
}

/// Concatenate length-prefixed fields into a single derivation input.
///
/// Each field is prefixed with its length as a u64 little-endian so that
/// `["ab", "c"]` and `["a", "bc"]` derive different keys.
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total: usize = fields.iter().map(|f| 8 + f.len()).sum();
    let mut out = Vec::with_capacity(total);
    for field in fields {
        out.extend_from_slice(&(field.len() as u64).to_le_bytes());
        out.extend_from_slice(field);
    }
    out
}
