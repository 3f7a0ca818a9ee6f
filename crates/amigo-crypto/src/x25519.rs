//! X25519 key agreement (RFC 7748).
//!
//! Each member carries one long-lived X25519 keypair next to its signing
//! keypair. The public half rides in the credential as the init key a
//! welcome is sealed to; the private half opens welcomes addressed here.
//! Only static secrets exist in this protocol — there is no per-session
//! ephemeral handshake on the radio link.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// An X25519 static secret key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct EcdhSecret {
    inner: StaticSecret,
}

/// An X25519 public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdhPublicKey {
    bytes: [u8; 32],
}

/// An X25519 shared secret.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl EcdhSecret {
    /// Generate a fresh random secret.
    pub fn generate() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Reconstruct a secret from its 32 raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    /// Raw bytes of this secret.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// The public key matching this secret.
    pub fn public_key(&self) -> EcdhPublicKey {
        let pk = x25519_dalek::PublicKey::from(&self.inner);
        EcdhPublicKey {
            bytes: pk.to_bytes(),
        }
    }

    /// Perform Diffie-Hellman key agreement with a peer's public key.
    pub fn diffie_hellman(&self, their_public: &EcdhPublicKey) -> SharedSecret {
        let pk = x25519_dalek::PublicKey::from(their_public.bytes);
        let shared = self.inner.diffie_hellman(&pk);
        SharedSecret {
            bytes: *shared.as_bytes(),
        }
    }
}

impl EcdhPublicKey {
    /// Reconstruct a public key from its 32 raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse a public key from its hex encoding (the credential field).
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("X25519 key must be 32 bytes".into()))?;
        Ok(Self { bytes })
    }

    /// Raw bytes of this public key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Raw bytes as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Hex encoding of this public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl SharedSecret {
    /// Raw bytes of the shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Debug for EcdhSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhSecret")
            .field("public", &self.public_key())
            .finish()
    }
}
