//! ChaCha20-Poly1305 AEAD encryption (RFC 8439).
//!
//! Used for group application traffic and inside the ECIES sealed box.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::{CryptoError, Result};

/// Key size (256 bits).
pub const KEY_SIZE: usize = 32;

/// Nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`/`nonce`, authenticating `aad`.
///
/// Returns the ciphertext with the 16-byte tag appended. The nonce must
/// never repeat under the same key.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecryption)
}

/// Decrypt `ciphertext` (tag appended) under `key`/`nonce`, checking `aad`.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecryption)
}
