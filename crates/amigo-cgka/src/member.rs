//! The local device member.
//!
//! A member owns the two device keypairs, the self-signed credential,
//! and one [`GroupState`] per group it belongs to. Every state advance
//! swaps the map entry atomically: operations take the state out,
//! produce the next one, and put it back only on success.

use std::collections::HashMap;

use amigo_crypto::ed25519::Keypair;
use amigo_crypto::x25519::EcdhSecret;
use amigo_types::Credential;

use crate::group::{
    self, CgkaCiphertext, GroupState, KeyPackage, PathUpdate, Welcome,
};
use crate::{CgkaError, Result};

/// Outcome of processing a path update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathOutcome {
    /// The group advanced to the update's epoch.
    Advanced,
    /// The update was a replay of a past epoch. Nothing changed.
    Duplicate,
}

/// The local device identity and its group map.
pub struct Member {
    signing: Keypair,
    ecdh: EcdhSecret,
    credential: Credential,
    groups: HashMap<[u8; 16], GroupState>,
}

impl Member {
    /// Create a fresh member: generate both keypairs and self-sign the
    /// credential.
    pub fn create(pseudonym: &str) -> Self {
        let signing = Keypair::generate();
        let ecdh = EcdhSecret::generate();
        let credential = Credential::issue(&signing, pseudonym, &ecdh.public_key());
        Self {
            signing,
            ecdh,
            credential,
            groups: HashMap::new(),
        }
    }

    /// Rebuild a member from persisted parts. The credential is assumed
    /// to have been verified by the blob's AEAD.
    pub fn from_parts(
        signing: Keypair,
        ecdh: EcdhSecret,
        credential: Credential,
        groups: Vec<GroupState>,
    ) -> Self {
        Self {
            signing,
            ecdh,
            credential,
            groups: groups.into_iter().map(|g| (*g.group_id(), g)).collect(),
        }
    }

    /// The member's credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The member id: the Ed25519 verification key bytes.
    pub fn member_id(&self) -> [u8; 32] {
        self.signing.verifying_key.to_bytes()
    }

    /// Hex encoding of the member id (the wire sender field).
    pub fn member_id_hex(&self) -> String {
        self.signing.verifying_key.to_hex()
    }

    /// The member's own key package.
    pub fn key_package(&self) -> KeyPackage {
        KeyPackage {
            member_id: self.member_id(),
            init_key: self.ecdh.public_key().to_bytes(),
        }
    }

    /// The signing keypair (for the persistence layer).
    pub fn signing_keypair(&self) -> &Keypair {
        &self.signing
    }

    /// The ECDH secret (for the persistence layer).
    pub fn ecdh_secret(&self) -> &EcdhSecret {
        &self.ecdh
    }

    /// Whether state exists for a group.
    pub fn has_group(&self, group_id: &[u8; 16]) -> bool {
        self.groups.contains_key(group_id)
    }

    /// State for a group, if any.
    pub fn group(&self, group_id: &[u8; 16]) -> Option<&GroupState> {
        self.groups.get(group_id)
    }

    /// Ids of every group the member belongs to.
    pub fn group_ids(&self) -> Vec<[u8; 16]> {
        self.groups.keys().copied().collect()
    }

    /// All group states (for the persistence layer).
    pub fn group_states(&self) -> Vec<&GroupState> {
        self.groups.values().collect()
    }

    /// Create a group with this member as the initial leaf.
    ///
    /// Idempotent: creating a group that already has state leaves the
    /// existing state untouched.
    pub fn create_group(&mut self, group_id: [u8; 16], capacity: u16, expandable: bool) {
        if self.groups.contains_key(&group_id) {
            return;
        }
        let state = group::create_group(group_id, &self.key_package(), capacity, expandable);
        self.groups.insert(group_id, state);
    }

    /// Admit a contact to a group, producing the welcome for them and
    /// the path update for everyone else.
    pub fn welcome_contact(
        &mut self,
        contact: &Credential,
        group_id: &[u8; 16],
        group_name: Option<String>,
    ) -> Result<(Welcome, PathUpdate)> {
        contact
            .verify()
            .map_err(|e| CgkaError::Credential(e.to_string()))?;

        let state = self
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| CgkaError::StateMissing(hex::encode(group_id)))?;

        let newcomer = KeyPackage {
            member_id: contact
                .verifying_key()
                .map_err(|e| CgkaError::Credential(e.to_string()))?
                .to_bytes(),
            init_key: contact
                .ecdh_key()
                .map_err(|e| CgkaError::Credential(e.to_string()))?
                .to_bytes(),
        };

        let member_id = self.member_id();
        let (next, welcome, update) = group::add_member(state, &member_id, &newcomer, group_name)?;
        self.groups.insert(*group_id, next);
        Ok((welcome, update))
    }

    /// Process an inbound welcome.
    ///
    /// Returns `true` if the member joined, `false` if state for the
    /// group already existed (the welcome is ignored). A welcome sealed
    /// to someone else fails to open and surfaces as a decrypt error.
    pub fn process_welcome(&mut self, welcome: &Welcome) -> Result<bool> {
        if self.groups.contains_key(&welcome.group_id) {
            return Ok(false);
        }
        let state = group::join_from_welcome(welcome, &self.ecdh)?;
        self.groups.insert(welcome.group_id, state);
        Ok(true)
    }

    /// Process an inbound path update.
    pub fn process_path_update(&mut self, update: &PathUpdate) -> Result<PathOutcome> {
        let state = self
            .groups
            .get(&update.group_id)
            .cloned()
            .ok_or_else(|| CgkaError::StateMissing(hex::encode(update.group_id)))?;

        match group::apply_path_update(state, update) {
            Ok(next) => {
                self.groups.insert(update.group_id, next);
                Ok(PathOutcome::Advanced)
            }
            Err(CgkaError::StaleEpoch { .. }) => Ok(PathOutcome::Duplicate),
            Err(e) => Err(e),
        }
    }

    /// Encrypt an application payload for a group.
    pub fn encrypt_for_group(
        &mut self,
        group_id: &[u8; 16],
        plaintext: &[u8],
    ) -> Result<CgkaCiphertext> {
        let member_id = self.member_id();
        let state = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| CgkaError::StateMissing(hex::encode(group_id)))?;
        state.encrypt_message(&member_id, plaintext)
    }

    /// Decrypt an application message, routed by its group id.
    pub fn decrypt(&self, ciphertext: &CgkaCiphertext) -> Result<Vec<u8>> {
        let state = self
            .groups
            .get(&ciphertext.group_id)
            .ok_or_else(|| CgkaError::StateMissing(hex::encode(ciphertext.group_id)))?;
        state.decrypt_message(ciphertext)
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("member_id", &self.member_id_hex())
            .field("pseudonym", &self.credential.pseudonym)
            .field("groups", &self.groups.len())
            .finish()
    }
}
