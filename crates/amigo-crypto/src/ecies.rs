//! ECIES-X25519-ChaCha20-BLAKE3 sealed box.
//!
//! A welcome carries the group epoch secret sealed to the addressee's
//! init key. Only the addressee can open the box; everyone else fails
//! authentication and drops the welcome.
//!
//! ```text
//! Seal(recipient_pk, plaintext):
//!   1. eph_sk <- random 32 bytes
//!   2. eph_pk = X25519(eph_sk, basepoint)
//!   3. shared = X25519(eph_sk, recipient_pk)
//!   4. key   = BLAKE3::derive_key("amigo v1 ecies-encryption-key",
//!              shared || eph_pk || recipient_pk)
//!   5. nonce = BLAKE3::derive_key("amigo v1 ecies-nonce",
//!              shared || eph_pk)[..12]
//!   6. return eph_pk || ChaCha20-Poly1305(key, nonce, plaintext, aad=eph_pk)
//! ```

use crate::blake3::{self, contexts};
use crate::chacha20;
use crate::x25519::{EcdhPublicKey, EcdhSecret};
use crate::{CryptoError, Result};

/// Seal `plaintext` to `recipient_pk`.
///
/// Returns `eph_pk (32) || ciphertext || tag (16)`.
pub fn seal(recipient_pk: &EcdhPublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let eph_secret = EcdhSecret::generate();
    let eph_pk = eph_secret.public_key();
    let shared = eph_secret.diffie_hellman(recipient_pk);

    let (key, nonce) = derive_box_keys(shared.as_bytes(), eph_pk.as_bytes(), recipient_pk);
    let ciphertext = chacha20::encrypt(&key, &nonce, plaintext, eph_pk.as_bytes())?;

    let mut out = Vec::with_capacity(32 + ciphertext.len());
    out.extend_from_slice(eph_pk.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a box sealed to `recipient_sk`'s public key.
pub fn open(recipient_sk: &EcdhSecret, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < 32 + chacha20::TAG_SIZE {
        return Err(CryptoError::SealedBox("sealed box too short".into()));
    }
    let mut eph_pk_bytes = [0u8; 32];
    eph_pk_bytes.copy_from_slice(&sealed[..32]);
    let eph_pk = EcdhPublicKey::from_bytes(eph_pk_bytes);

    let shared = recipient_sk.diffie_hellman(&eph_pk);
    let recipient_pk = recipient_sk.public_key();
    let (key, nonce) = derive_box_keys(shared.as_bytes(), &eph_pk_bytes, &recipient_pk);

    chacha20::decrypt(&key, &nonce, &sealed[32..], &eph_pk_bytes)
        .map_err(|_| CryptoError::SealedBox("authentication failed".into()))
}

/// Derive the AEAD key and nonce for one box.
fn derive_box_keys(
    shared: &[u8; 32],
    eph_pk: &[u8; 32],
    recipient_pk: &EcdhPublicKey,
) -> ([u8; 32], [u8; 12]) {
    let key_material = blake3::encode_multi_field(&[shared, eph_pk, recipient_pk.as_bytes()]);
    let key = blake3::derive_key(contexts::ECIES_ENCRYPTION_KEY, &key_material);

    let nonce_material = blake3::encode_multi_field(&[shared, eph_pk]);
    let nonce_full = blake3::derive_key(contexts::ECIES_NONCE, &nonce_material);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&nonce_full[..12]);

    (key, nonce)
}
