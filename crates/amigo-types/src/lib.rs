//! # amigo-types
//!
//! Shared plain-data structures for the amigo mesh transport.
//!
//! These are the records that cross crate boundaries: the self-signed
//! device credential, contacts, groups, chat messages, and the durable
//! outbox rows. Wire codecs live in `amigo-wire`; persistence lives in
//! `amigo-db`.

pub mod device;
pub mod group;
pub mod identity;
pub mod message;

pub use device::ConnectedDevice;
pub use group::{Group, GroupMember};
pub use identity::{Contact, Credential};
pub use message::{
    ChatMessage, ControlPacketType, OutgoingControlMessage, OutgoingMessage, PendingDeliveryAck,
};

/// Error types for shared-structure validation.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// A credential failed offline re-verification.
    #[error("credential verification failed: {0}")]
    CredentialInvalid(String),

    /// A hex-encoded field does not parse.
    #[error("invalid hex field: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, TypeError>;
