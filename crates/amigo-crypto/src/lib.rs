//! # amigo-crypto
//!
//! Cryptographic primitives for the amigo mesh transport.
//!
//! The cryptographic suite is fixed; no algorithm negotiation happens on
//! the wire. Every other crate in the workspace goes through these wrappers
//! rather than using the underlying crates directly.
//!
//! ## Modules
//!
//! - [`ed25519`] — credential signing and verification (RFC 8032)
//! - [`x25519`] — key agreement for the group handshake (RFC 7748)
//! - [`chacha20`] — ChaCha20-Poly1305 AEAD for group application traffic
//! - [`aes_gcm`] — AES-256-GCM sealed blobs with an embedded nonce
//!   (member identity at rest)
//! - [`ecies`] — X25519 + BLAKE3 + ChaCha20-Poly1305 sealed box
//!   (welcome secret transport)
//! - [`blake3`] — domain-separated hashing and key derivation

pub mod aes_gcm;
pub mod blake3;
pub mod chacha20;
pub mod ecies;
pub mod ed25519;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD decryption failed (authentication tag mismatch).
    #[error("AEAD decryption failed")]
    AeadDecryption,

    /// Sealed box could not be opened (wrong recipient or corrupted data).
    #[error("sealed box error: {0}")]
    SealedBox(String),

    /// Input bytes do not form a valid key, signature, or blob.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
