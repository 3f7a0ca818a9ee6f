//! AES-256-GCM sealed blobs with an embedded nonce.
//!
//! Used for the member identity file at rest. The nonce is generated
//! fresh on every seal and prepended to the ciphertext, so a blob is
//! self-contained: `nonce (12) || ciphertext || tag (16)`. The companion
//! write path (tempfile then rename) lives with the secret store; this
//! module only handles the bytes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;

use crate::{CryptoError, Result};

/// Key size (256 bits).
pub const KEY_SIZE: usize = 32;

/// Nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Seal `plaintext` under `key` with a random embedded nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::AeadDecryption)?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a blob produced by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidInput("sealed blob too short".into()));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AeadDecryption)
}
