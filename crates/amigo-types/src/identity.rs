//! Device credential and contact records.

use amigo_crypto::blake3;
use amigo_crypto::ed25519::{Keypair, Signature, VerifyingKey};
use amigo_crypto::x25519::EcdhPublicKey;
use serde::{Deserialize, Serialize};

use crate::{Result, TypeError};

/// A device's self-signed credential.
///
/// The signature binds the pseudonym and the ECDH public key under the
/// verification key, so a credential received out of band re-verifies
/// offline. All key material is hex-encoded: the same representation
/// rides in announce payloads and the contacts table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Hex-encoded Ed25519 verification key (the device identity).
    pub verification_key: String,
    /// Human-chosen display name. Not unique and not trusted.
    pub pseudonym: String,
    /// Hex-encoded Ed25519 signature over the pseudonym and ECDH key.
    pub signature: String,
    /// Hex-encoded X25519 public key welcomes are sealed to.
    pub ecdh_public_key: String,
}

impl Credential {
    /// Issue a credential: sign `pseudonym || ecdh_public_key` with the
    /// device signing key.
    pub fn issue(keypair: &Keypair, pseudonym: &str, ecdh_public_key: &EcdhPublicKey) -> Self {
        let body = Self::signing_body(pseudonym, ecdh_public_key.as_bytes());
        let signature = keypair.signing_key.sign(&body);
        Self {
            verification_key: keypair.verifying_key.to_hex(),
            pseudonym: pseudonym.to_string(),
            signature: signature.to_hex(),
            ecdh_public_key: ecdh_public_key.to_hex(),
        }
    }

    /// Re-verify the credential offline.
    pub fn verify(&self) -> Result<()> {
        let key = VerifyingKey::from_hex(&self.verification_key)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let signature = Signature::from_hex(&self.signature)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let ecdh = EcdhPublicKey::from_hex(&self.ecdh_public_key)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))?;

        let body = Self::signing_body(&self.pseudonym, ecdh.as_bytes());
        key.verify(&body, &signature)
            .map_err(|e| TypeError::CredentialInvalid(e.to_string()))
    }

    /// Parsed ECDH public key.
    pub fn ecdh_key(&self) -> Result<EcdhPublicKey> {
        EcdhPublicKey::from_hex(&self.ecdh_public_key)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))
    }

    /// Parsed verification key.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_hex(&self.verification_key)
            .map_err(|e| TypeError::InvalidHex(e.to_string()))
    }

    /// Canonical signed bytes for a credential body.
    fn signing_body(pseudonym: &str, ecdh_public_key: &[u8; 32]) -> Vec<u8> {
        blake3::encode_multi_field(&[pseudonym.as_bytes(), ecdh_public_key])
    }
}

/// A remote peer's credential plus its local row id.
///
/// Contacts are keyed uniquely by verification key; the numeric id only
/// exists for group-membership edges.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    /// Local row id.
    pub id: i64,
    /// The peer's credential.
    pub credential: Credential,
    /// Unix ms when the contact was first stored.
    pub created_at: i64,
    /// Unix ms when the contact was last updated.
    pub updated_at: i64,
}
