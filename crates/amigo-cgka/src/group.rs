//! Group state and the epoch key schedule.
//!
//! A group's cryptographic state is the current epoch number, the epoch
//! secret, and the member list. Membership changes and key rotations
//! advance the epoch: every holder of secret `n` derives secret `n+1`
//! from public change data, while a newcomer receives secret `n+1`
//! directly, sealed to their init key inside a welcome. Decryption of a
//! message from any other epoch fails; the caller treats that as a
//! benign duplicate.

use amigo_crypto::blake3::{self, contexts};
use amigo_crypto::chacha20;
use amigo_crypto::ecies;
use amigo_crypto::x25519::{EcdhPublicKey, EcdhSecret};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{CgkaError, Result};

/// A member's public key material for joining a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPackage {
    /// The member's identity: their Ed25519 verification key bytes.
    pub member_id: [u8; 32],
    /// The X25519 key a welcome for this member is sealed to.
    pub init_key: [u8; 32],
}

/// A welcome admitting one new member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Welcome {
    /// The group being joined.
    pub group_id: [u8; 16],
    /// Display name, carried for first contact with the group.
    pub group_name: Option<String>,
    /// The epoch the newcomer joins at.
    pub epoch: u64,
    /// The epoch secret, ECIES-sealed to the newcomer's init key.
    pub sealed_epoch_secret: Vec<u8>,
    /// Member ids as of `epoch`, newcomer included.
    pub member_ids: Vec<[u8; 32]>,
    /// Group capacity.
    pub capacity: u16,
    /// Whether capacity may be raised later.
    pub expandable: bool,
}

/// A path update advancing the group epoch.
///
/// Holders of the previous epoch secret derive the next one from the
/// `change_data`; the update itself carries no secrets.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathUpdate {
    /// The group being advanced.
    pub group_id: [u8; 16],
    /// The epoch this update advances to (current + 1 at the committer).
    pub epoch: u64,
    /// The committing member.
    pub committer_id: [u8; 32],
    /// Member admitted by this update, if it is an add.
    pub joined: Option<[u8; 32]>,
    /// Public key-schedule input for the next epoch secret.
    pub change_data: [u8; 32],
}

/// An encrypted application message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CgkaCiphertext {
    /// The group the message belongs to.
    pub group_id: [u8; 16],
    /// The epoch the message was encrypted in.
    pub epoch: u64,
    /// The sender's member id.
    pub sender_id: [u8; 32],
    /// AEAD nonce.
    pub nonce: [u8; 12],
    /// Ciphertext with appended tag.
    pub ciphertext: Vec<u8>,
}

/// The per-epoch secret bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupSecret {
    /// Root secret for this epoch.
    pub epoch_secret: [u8; 32],
    /// AEAD key derived from the epoch secret.
    pub message_key: [u8; 32],
    /// Nonce base; per-message nonces XOR a counter into it.
    pub nonce_base: [u8; 12],
}

/// Cryptographic state of one group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupState {
    group_id: [u8; 16],
    epoch: u64,
    capacity: u16,
    expandable: bool,
    secret: GroupSecret,
    members: Vec<[u8; 32]>,
    message_counter: u64,
}

impl GroupState {
    /// The group id.
    pub fn group_id(&self) -> &[u8; 16] {
        &self.group_id
    }

    /// The current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The member count.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// The group capacity.
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Whether a member id is in the group.
    pub fn has_member(&self, member_id: &[u8; 32]) -> bool {
        self.members.contains(member_id)
    }

    /// All member ids.
    pub fn member_ids(&self) -> &[[u8; 32]] {
        &self.members
    }

    /// Raise the capacity of an expandable group.
    pub fn expand_capacity(&mut self, capacity: u16) -> Result<()> {
        if !self.expandable {
            return Err(CgkaError::NotExpandable);
        }
        self.capacity = self.capacity.max(capacity);
        Ok(())
    }

    /// Encrypt an application payload under the current epoch.
    pub fn encrypt_message(
        &mut self,
        sender_id: &[u8; 32],
        plaintext: &[u8],
    ) -> Result<CgkaCiphertext> {
        let nonce = self.next_nonce();
        let ciphertext = chacha20::encrypt(
            &self.secret.message_key,
            &nonce,
            plaintext,
            &self.group_id,
        )
        .map_err(|e| CgkaError::Decrypt(e.to_string()))?;

        Ok(CgkaCiphertext {
            group_id: self.group_id,
            epoch: self.epoch,
            sender_id: *sender_id,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt an application message.
    ///
    /// # Errors
    ///
    /// [`CgkaError::WrongGroup`] if the ciphertext names another group,
    /// [`CgkaError::StaleEpoch`] on any epoch mismatch (benign under
    /// replay), [`CgkaError::Decrypt`] on tag failure.
    pub fn decrypt_message(&self, ciphertext: &CgkaCiphertext) -> Result<Vec<u8>> {
        if ciphertext.group_id != self.group_id {
            return Err(CgkaError::WrongGroup(hex::encode(ciphertext.group_id)));
        }
        if ciphertext.epoch != self.epoch {
            return Err(CgkaError::StaleEpoch {
                current: self.epoch,
                got: ciphertext.epoch,
            });
        }
        chacha20::decrypt(
            &self.secret.message_key,
            &ciphertext.nonce,
            &ciphertext.ciphertext,
            &self.group_id,
        )
        .map_err(|e| CgkaError::Decrypt(e.to_string()))
    }

    fn next_nonce(&mut self) -> [u8; 12] {
        let mut nonce = self.secret.nonce_base;
        for (i, b) in self.message_counter.to_le_bytes().iter().enumerate() {
            nonce[i] ^= b;
        }
        self.message_counter += 1;
        nonce
    }
}

/// Create a group with the creator as sole member at epoch 0.
pub fn create_group(
    group_id: [u8; 16],
    creator: &KeyPackage,
    capacity: u16,
    expandable: bool,
) -> GroupState {
    let material =
        blake3::encode_multi_field(&[&group_id, &creator.member_id, &creator.init_key]);
    let epoch_secret = blake3::derive_key(contexts::GROUP_EPOCH_SECRET, &material);

    GroupState {
        group_id,
        epoch: 0,
        capacity: capacity.max(1),
        expandable,
        secret: expand_epoch_secret(&epoch_secret),
        members: vec![creator.member_id],
        message_counter: 0,
    }
}

/// Add a member, advancing the epoch.
///
/// Consumes the state and returns the next one, a [`Welcome`] sealed to
/// the newcomer's init key, and the [`PathUpdate`] that carries every
/// existing member to the same epoch. Re-adding an existing member is
/// rejected with [`CgkaError::MemberExists`]; the caller treats its own
/// leaf as idempotent.
pub fn add_member(
    mut group: GroupState,
    committer_id: &[u8; 32],
    newcomer: &KeyPackage,
    group_name: Option<String>,
) -> Result<(GroupState, Welcome, PathUpdate)> {
    if group.has_member(&newcomer.member_id) {
        return Err(CgkaError::MemberExists(hex::encode(newcomer.member_id)));
    }
    if group.members.len() >= group.capacity as usize {
        return Err(CgkaError::GroupFull {
            capacity: group.capacity,
        });
    }

    group.epoch += 1;
    group.members.push(newcomer.member_id);
    group.secret = derive_next_secret(&group.secret, &newcomer.member_id, group.epoch);
    group.message_counter = 0;

    let sealed_epoch_secret = ecies::seal(
        &EcdhPublicKey::from_bytes(newcomer.init_key),
        &group.secret.epoch_secret,
    )
    .map_err(|e| CgkaError::Decrypt(e.to_string()))?;

    let welcome = Welcome {
        group_id: group.group_id,
        group_name,
        epoch: group.epoch,
        sealed_epoch_secret,
        member_ids: group.members.clone(),
        capacity: group.capacity,
        expandable: group.expandable,
    };

    let update = PathUpdate {
        group_id: group.group_id,
        epoch: group.epoch,
        committer_id: *committer_id,
        joined: Some(newcomer.member_id),
        change_data: newcomer.member_id,
    };

    tracing::debug!(
        group_id = hex::encode(group.group_id),
        member = hex::encode(newcomer.member_id),
        epoch = group.epoch,
        "added member to group"
    );

    Ok((group, welcome, update))
}

/// Rotate the epoch secret without changing membership.
pub fn update_keys(mut group: GroupState, committer_id: &[u8; 32]) -> (GroupState, PathUpdate) {
    let mut change_data = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut change_data);

    group.epoch += 1;
    group.secret = derive_next_secret(&group.secret, &change_data, group.epoch);
    group.message_counter = 0;

    let update = PathUpdate {
        group_id: group.group_id,
        epoch: group.epoch,
        committer_id: *committer_id,
        joined: None,
        change_data,
    };

    (group, update)
}

/// Derive a joined group's state from a welcome.
pub fn join_from_welcome(welcome: &Welcome, init_secret: &EcdhSecret) -> Result<GroupState> {
    let opened = ecies::open(init_secret, &welcome.sealed_epoch_secret)
        .map_err(|e| CgkaError::Decrypt(e.to_string()))?;
    let epoch_secret: [u8; 32] = opened
        .try_into()
        .map_err(|_| CgkaError::Decrypt("epoch secret must be 32 bytes".into()))?;

    Ok(GroupState {
        group_id: welcome.group_id,
        epoch: welcome.epoch,
        capacity: welcome.capacity.max(1),
        expandable: welcome.expandable,
        secret: expand_epoch_secret(&epoch_secret),
        members: welcome.member_ids.clone(),
        message_counter: 0,
    })
}

/// Apply a path update, advancing to its epoch.
///
/// # Errors
///
/// [`CgkaError::StaleEpoch`] when the update is at or behind the current
/// epoch (a benign duplicate), [`CgkaError::EpochGap`] when it skips
/// ahead of `current + 1`.
pub fn apply_path_update(mut group: GroupState, update: &PathUpdate) -> Result<GroupState> {
    if update.group_id != group.group_id {
        return Err(CgkaError::WrongGroup(hex::encode(update.group_id)));
    }
    if update.epoch <= group.epoch {
        return Err(CgkaError::StaleEpoch {
            current: group.epoch,
            got: update.epoch,
        });
    }
    if update.epoch != group.epoch + 1 {
        return Err(CgkaError::EpochGap {
            current: group.epoch,
            got: update.epoch,
        });
    }

    group.epoch = update.epoch;
    group.secret = derive_next_secret(&group.secret, &update.change_data, group.epoch);
    group.message_counter = 0;
    if let Some(joined) = update.joined {
        if !group.members.contains(&joined) {
            group.members.push(joined);
        }
    }

    tracing::debug!(
        group_id = hex::encode(group.group_id),
        epoch = group.epoch,
        "applied path update"
    );

    Ok(group)
}

/// Derive the next epoch secret from the current one and change data.
fn derive_next_secret(current: &GroupSecret, change_data: &[u8], epoch: u64) -> GroupSecret {
    let material = blake3::encode_multi_field(&[
        &current.epoch_secret,
        change_data,
        &epoch.to_be_bytes(),
    ]);
    let epoch_secret = blake3::derive_key(contexts::GROUP_EPOCH_SECRET, &material);
    expand_epoch_secret(&epoch_secret)
}

/// Expand an epoch secret into the message key and nonce base.
fn expand_epoch_secret(epoch_secret: &[u8; 32]) -> GroupSecret {
    let message_key = blake3::derive_key(contexts::GROUP_MESSAGE_KEY, epoch_secret);
    let nonce_full = blake3::derive_key(contexts::GROUP_NONCE_BASE, epoch_secret);
    let mut nonce_base = [0u8; 12];
    nonce_base.copy_from_slice(&nonce_full[..12]);

    GroupSecret {
        epoch_secret: *epoch_secret,
        message_key,
        nonce_base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMember {
        key_package: KeyPackage,
        init_secret: EcdhSecret,
    }

    fn make_member(id: u8) -> TestMember {
        let init_secret = EcdhSecret::generate();
        TestMember {
            key_package: KeyPackage {
                member_id: [id; 32],
                init_key: init_secret.public_key().to_bytes(),
            },
            init_secret,
        }
    }

    #[test]
    fn test_create_group() {
        let alice = make_member(1);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);
        assert_eq!(group.epoch(), 0);
        assert_eq!(group.member_count(), 1);
        assert!(group.has_member(&[1; 32]));
    }

    #[test]
    fn test_add_member_produces_matching_states() {
        let alice = make_member(1);
        let bob = make_member(2);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);

        let (mut alice_group, welcome, _update) =
            add_member(group, &[1; 32], &bob.key_package, None).expect("add member");
        let bob_group = join_from_welcome(&welcome, &bob.init_secret).expect("join");

        assert_eq!(alice_group.epoch(), bob_group.epoch());
        assert_eq!(alice_group.member_ids(), bob_group.member_ids());

        let ciphertext = alice_group
            .encrypt_message(&[1; 32], b"hola bob")
            .expect("encrypt");
        let plaintext = bob_group.decrypt_message(&ciphertext).expect("decrypt");
        assert_eq!(plaintext, b"hola bob");
    }

    #[test]
    fn test_welcome_only_opens_for_addressee() {
        let alice = make_member(1);
        let bob = make_member(2);
        let eve = make_member(3);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);

        let (_group, welcome, _update) =
            add_member(group, &[1; 32], &bob.key_package, None).expect("add member");
        assert!(join_from_welcome(&welcome, &eve.init_secret).is_err());
    }

    #[test]
    fn test_path_update_advances_existing_members() {
        let alice = make_member(1);
        let bob = make_member(2);
        let carol = make_member(3);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);

        // Bob joins via welcome.
        let (alice_group, welcome, _update) =
            add_member(group, &[1; 32], &bob.key_package, None).expect("add bob");
        let bob_group = join_from_welcome(&welcome, &bob.init_secret).expect("bob joins");

        // Carol joins; Bob advances via the path update alone.
        let (mut alice_group, _welcome, update) =
            add_member(alice_group, &[1; 32], &carol.key_package, None).expect("add carol");
        let bob_group = apply_path_update(bob_group, &update).expect("bob advances");

        assert_eq!(alice_group.epoch(), 2);
        assert_eq!(bob_group.epoch(), 2);
        assert!(bob_group.has_member(&[3; 32]));

        let ciphertext = alice_group
            .encrypt_message(&[1; 32], b"three of us now")
            .expect("encrypt");
        assert_eq!(
            bob_group.decrypt_message(&ciphertext).expect("decrypt"),
            b"three of us now"
        );
    }

    #[test]
    fn test_duplicate_path_update_is_stale() {
        let alice = make_member(1);
        let bob = make_member(2);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);
        let (_group, welcome, update) =
            add_member(group, &[1; 32], &bob.key_package, None).expect("add bob");
        let bob_group = join_from_welcome(&welcome, &bob.init_secret).expect("join");

        // Bob already sits at the update's epoch.
        let result = apply_path_update(bob_group, &update);
        assert!(matches!(result, Err(CgkaError::StaleEpoch { .. })));
    }

    #[test]
    fn test_epoch_gap_rejected() {
        let alice = make_member(1);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);
        let update = PathUpdate {
            group_id: [0xAA; 16],
            epoch: 5,
            committer_id: [1; 32],
            joined: None,
            change_data: [0; 32],
        };
        assert!(matches!(
            apply_path_update(group, &update),
            Err(CgkaError::EpochGap { .. })
        ));
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let alice = make_member(1);
        let group = create_group([0xAA; 16], &alice.key_package, 8, true);
        let result = add_member(group, &[1; 32], &alice.key_package, None);
        assert!(matches!(result, Err(CgkaError::MemberExists(_))));
    }

    #[test]
    fn test_capacity_enforced() {
        let alice = make_member(1);
        let bob = make_member(2);
        let carol = make_member(3);
        let group = create_group([0xAA; 16], &alice.key_package, 2, false);

        let (group, _w, _u) =
            add_member(group, &[1; 32], &bob.key_package, None).expect("add bob");
        let result = add_member(group, &[1; 32], &carol.key_package, None);
        assert!(matches!(result, Err(CgkaError::GroupFull { capacity: 2 })));
    }

    #[test]
    fn test_expand_capacity() {
        let alice = make_member(1);
        let mut fixed = create_group([0xAA; 16], &alice.key_package, 2, false);
        assert!(matches!(
            fixed.expand_capacity(10),
            Err(CgkaError::NotExpandable)
        ));

        let mut open = create_group([0xBB; 16], &alice.key_package, 2, true);
        open.expand_capacity(10).expect("expand");
        assert_eq!(open.capacity(), 10);
    }

    #[test]
    fn test_cross_group_decrypt_fails() {
        let alice = make_member(1);
        let mut g1 = create_group([0x01; 16], &alice.key_package, 4, true);
        let g2 = create_group([0x02; 16], &alice.key_package, 4, true);

        let ciphertext = g1.encrypt_message(&[1; 32], b"for g1").expect("encrypt");
        assert!(matches!(
            g2.decrypt_message(&ciphertext),
            Err(CgkaError::WrongGroup(_))
        ));
    }

    #[test]
    fn test_stale_epoch_decrypt_fails() {
        let alice = make_member(1);
        let mut group = create_group([0xAA; 16], &alice.key_package, 4, true);
        let ciphertext = group.encrypt_message(&[1; 32], b"old").expect("encrypt");

        let (group, _update) = update_keys(group, &[1; 32]);
        assert!(matches!(
            group.decrypt_message(&ciphertext),
            Err(CgkaError::StaleEpoch { .. })
        ));
    }

    #[test]
    fn test_nonces_never_repeat_within_epoch() {
        let alice = make_member(1);
        let mut group = create_group([0xAA; 16], &alice.key_package, 4, true);
        let a = group.encrypt_message(&[1; 32], b"one").expect("encrypt");
        let b = group.encrypt_message(&[1; 32], b"two").expect("encrypt");
        assert_ne!(a.nonce, b.nonce);

        assert_eq!(group.decrypt_message(&a).expect("decrypt"), b"one");
        assert_eq!(group.decrypt_message(&b).expect("decrypt"), b"two");
    }

    #[test]
    fn test_key_rotation_changes_secret() {
        let alice = make_member(1);
        let group = create_group([0xAA; 16], &alice.key_package, 4, true);
        let before = group.secret.epoch_secret;
        let (group, update) = update_keys(group, &[1; 32]);
        assert_eq!(group.epoch(), 1);
        assert_eq!(update.epoch, 1);
        assert!(update.joined.is_none());
        assert_ne!(before, group.secret.epoch_secret);
    }
}
