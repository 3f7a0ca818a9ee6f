//! # amigo-wire
//!
//! Binary wire codecs for the amigo mesh transport.
//!
//! Everything that touches raw radio bytes is here:
//!
//! - [`packet`] — the packet frame, type registry, fingerprint, and the
//!   16-byte gossip packet id
//! - [`payload`] — the message, delivery-ack, and announce payload codecs
//! - [`fragment`] — splitting oversize payloads and the pure reassembler
//! - [`sync`] — the gossip `RequestSync` payload
//!
//! All multi-byte integers are big-endian. Layouts are fixed; there is no
//! negotiation and no self-describing framing on the radio link.

pub mod fragment;
pub mod packet;
pub mod payload;
pub mod sync;

/// Error types for wire encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Bytes do not parse as a packet or payload.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// The version byte is not one this implementation speaks.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Version compatible but the type byte is unallocated.
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    /// The fragment type byte is not one of the fragmentable types.
    #[error("unknown fragment type {0}")]
    UnknownFragmentType(u8),

    /// A payload exceeds the frame's u16 length field.
    #[error("payload too large: {len} bytes, max {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Splitting would emit more than 65535 fragments.
    #[error("payload would need {count} fragments, max 65535")]
    TooManyFragments { count: usize },

    /// A fragment set disagrees on id, total, or index coverage.
    #[error("fragment mismatch: {0}")]
    FragmentMismatch(String),
}

pub type Result<T> = std::result::Result<T, WireError>;
