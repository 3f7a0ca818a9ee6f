//! Ed25519 signing and verification (RFC 8032).
//!
//! Every device carries one long-lived Ed25519 keypair. Its verification
//! key is the device's identity on the mesh: credentials are signed under
//! it, contacts are keyed by it, and message senders are named by its hex
//! encoding. This module wraps `ed25519-dalek` so key material never
//! leaks outside controlled byte conversions.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// An Ed25519 signing key (private half).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

/// An Ed25519 verification key (public half).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

/// A signing/verification keypair.
pub struct Keypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl SigningKey {
    /// Generate a fresh random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Reconstruct a signing key from its 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Raw bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// The verification key matching this signing key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        let mut bytes = self.inner.to_bytes();
        bytes.zeroize();
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}

impl VerifyingKey {
    /// Reconstruct a verification key from its 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a verification key from its hex encoding (the sender field
    /// of a message payload).
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("verification key must be 32 bytes".into()))?;
        Self::from_bytes(&bytes)
    }

    /// Raw bytes of this verification key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Raw bytes as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }

    /// Hex encoding of this verification key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.inner
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    /// Reconstruct a signature from its 64 raw bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Parse a signature from its hex encoding.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 64] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("signature must be 64 bytes".into()))?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Raw bytes of this signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Hex encoding of this signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.to_bytes())
    }
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate();
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a keypair from the signing key's raw bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: self.signing_key.clone(),
            verifying_key: self.verifying_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = Keypair::generate();
        let sig = kp.signing_key.sign(b"credential body");
        assert!(kp.verifying_key.verify(b"credential body", &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_rejected() {
        let kp = Keypair::generate();
        let sig = kp.signing_key.sign(b"signed");
        assert!(kp.verifying_key.verify(b"tampered", &sig).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let sig = alice.signing_key.sign(b"hello");
        assert!(mallory.verifying_key.verify(b"hello", &sig).is_err());
    }

    #[test]
    fn test_keypair_from_bytes_deterministic() {
        let kp = Keypair::generate();
        let restored = Keypair::from_bytes(&kp.signing_key.to_bytes());
        assert_eq!(kp.verifying_key, restored.verifying_key);
    }

    #[test]
    fn test_hex_roundtrip() {
        let kp = Keypair::generate();
        let hex = kp.verifying_key.to_hex();
        assert_eq!(hex.len(), 64);
        let restored = VerifyingKey::from_hex(&hex).expect("parse hex key");
        assert_eq!(kp.verifying_key, restored);

        let sig = kp.signing_key.sign(b"x");
        let restored_sig = Signature::from_hex(&sig.to_hex()).expect("parse hex sig");
        assert_eq!(sig, restored_sig);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(VerifyingKey::from_hex("zz").is_err());
        assert!(VerifyingKey::from_hex("abcd").is_err());
        assert!(Signature::from_hex("00").is_err());
    }
}
