//! Chat messages and the durable outbox rows.

use serde::{Deserialize, Serialize};

/// An application chat message.
///
/// This is the canonical plaintext: the binary payload codec in
/// `amigo-wire` serializes exactly these fields, and the messages table
/// persists them after decryption (or at local send time).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// UUID string.
    pub id: String,
    /// Hex-encoded 128-bit group id.
    pub group_id: String,
    /// Hex verification key of the sender.
    pub sender: String,
    /// UTF-8 message body.
    pub contents: String,
    /// Unix ms at the sender.
    pub timestamp: i64,
}

/// An application message awaiting delivery acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// The message being delivered.
    pub message: ChatMessage,
    /// Broadcast attempts so far.
    pub retry_count: u32,
    /// Unix ms of the last retry, if any.
    pub last_retry_at: Option<i64>,
    /// Unix ms when the row was created.
    pub created_at: i64,
}

/// Which control payload an [`OutgoingControlMessage`] carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPacketType {
    /// A group welcome admitting the recipient.
    Welcome,
    /// A path update advancing the group epoch.
    PathUpdate,
}

/// A CGKA control payload awaiting evidence of the recipient's state
/// advance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingControlMessage {
    /// Row id (UUID string).
    pub id: String,
    /// Welcome or path update.
    pub packet_type: ControlPacketType,
    /// Base64 of the encoded control payload bytes.
    pub payload_base64: String,
    /// Hex verification key of the addressee.
    pub recipient_verification_key: String,
    /// Broadcast attempts so far.
    pub retry_count: u32,
    /// Unix ms of the last retry, if any.
    pub last_retry_at: Option<i64>,
    /// Unix ms when the row was created.
    pub created_at: i64,
}

/// A delivery acknowledgment this device owes a sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeliveryAck {
    /// Id of the message being acknowledged.
    pub message_id: String,
    /// Hex verification key of the original sender (the ack's addressee).
    pub recipient_verification_key: String,
    /// Broadcast attempts so far.
    pub retry_count: u32,
    /// Unix ms of the last retry, if any.
    pub last_retry_at: Option<i64>,
    /// Unix ms when the row was created.
    pub created_at: i64,
}
