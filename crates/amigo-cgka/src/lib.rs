//! # amigo-cgka
//!
//! Continuous group key agreement for the amigo mesh.
//!
//! Each group is a shared symmetric key schedule advanced by epochs: a
//! welcome admits a member by sealing the current epoch secret to their
//! init key, and a path update advances every holder of the previous
//! secret to the next one. Application traffic is AEAD-encrypted under
//! the per-epoch message key.
//!
//! ## Modules
//!
//! - [`group`] — group state, epoch key schedule, welcome/path-update
//!   production and consumption, application encrypt/decrypt
//! - [`member`] — the local device: keypairs, credential, group map
//! - [`persist`] — the sealed member blob for at-rest storage
//!
//! State advances never mutate in place across an operation boundary:
//! operations consume a state and return the next one, and [`member`]
//! atomically swaps the entry in its group map.

pub mod group;
pub mod member;
pub mod persist;

/// Error types for group key agreement.
#[derive(Debug, thiserror::Error)]
pub enum CgkaError {
    /// No state exists for the group an operation names.
    #[error("no group state for {0}")]
    StateMissing(String),

    /// The operation belongs to an epoch at or before the current one.
    /// Benign under replay.
    #[error("stale epoch {got}, current {current}")]
    StaleEpoch { current: u64, got: u64 },

    /// The operation skips ahead of the next epoch; base state is absent.
    #[error("epoch gap: got {got}, current {current}")]
    EpochGap { current: u64, got: u64 },

    /// The member is already in the group.
    #[error("member already in group: {0}")]
    MemberExists(String),

    /// The group is at capacity.
    #[error("group is at capacity ({capacity} members)")]
    GroupFull { capacity: u16 },

    /// The group's capacity is fixed.
    #[error("group is not expandable")]
    NotExpandable,

    /// The ciphertext names a different group.
    #[error("ciphertext is for group {0}")]
    WrongGroup(String),

    /// AEAD or sealed-box failure (corrupted ciphertext, wrong recipient).
    #[error("decrypt failed: {0}")]
    Decrypt(String),

    /// A credential failed verification.
    #[error("credential rejected: {0}")]
    Credential(String),

    /// CBOR encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CgkaError>;

/// CBOR helpers for the structured payloads that ride inside packets.
pub mod codec {
    use serde::{de::DeserializeOwned, Serialize};

    use crate::CgkaError;

    /// Serialize a value to CBOR bytes.
    pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, CgkaError> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| CgkaError::Serialization(format!("CBOR encode failed: {e}")))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR bytes.
    pub fn from_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, CgkaError> {
        ciborium::from_reader(data)
            .map_err(|e| CgkaError::Serialization(format!("CBOR decode failed: {e}")))
    }
}
