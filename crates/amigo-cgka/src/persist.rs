//! The sealed member blob.
//!
//! The member's keypairs, credential, and group states serialize to one
//! CBOR blob, sealed with AES-256-GCM under a 32-byte device secret. The
//! nonce is embedded in the blob, so the secret store holds exactly two
//! opaque values: the device secret and the blob. Atomic file replacement
//! (tempfile then rename) is the secret store's concern.

use amigo_crypto::aes_gcm;
use amigo_crypto::ed25519::Keypair;
use amigo_crypto::x25519::EcdhSecret;
use amigo_types::Credential;
use serde::{Deserialize, Serialize};

use crate::group::GroupState;
use crate::member::Member;
use crate::{codec, CgkaError, Result};

/// The serialized member record inside the sealed blob.
#[derive(Serialize, Deserialize)]
struct MemberBlob {
    signing_secret: [u8; 32],
    ecdh_secret: [u8; 32],
    credential: Credential,
    groups: Vec<GroupState>,
}

/// Serialize and seal a member under the device secret.
pub fn seal_member(member: &Member, device_secret: &[u8; 32]) -> Result<Vec<u8>> {
    let blob = MemberBlob {
        signing_secret: member.signing_keypair().signing_key.to_bytes(),
        ecdh_secret: member.ecdh_secret().to_bytes(),
        credential: member.credential().clone(),
        groups: member.group_states().into_iter().cloned().collect(),
    };
    let plain = codec::to_vec(&blob)?;
    aes_gcm::seal(device_secret, &plain).map_err(|e| CgkaError::Decrypt(e.to_string()))
}

/// Open a sealed blob and rebuild the member.
pub fn open_member(sealed: &[u8], device_secret: &[u8; 32]) -> Result<Member> {
    let plain = aes_gcm::open(device_secret, sealed)
        .map_err(|e| CgkaError::Decrypt(e.to_string()))?;
    let blob: MemberBlob = codec::from_slice(&plain)?;

    Ok(Member::from_parts(
        Keypair::from_bytes(&blob.signing_secret),
        EcdhSecret::from_bytes(blob.ecdh_secret),
        blob.credential,
        blob.groups,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let mut member = Member::create("alice");
        member.create_group([7; 16], 4, true);
        let secret = [0x55u8; 32];

        let sealed = seal_member(&member, &secret).expect("seal");
        let restored = open_member(&sealed, &secret).expect("open");

        assert_eq!(restored.member_id(), member.member_id());
        assert_eq!(restored.credential(), member.credential());
        assert!(restored.has_group(&[7; 16]));
        assert_eq!(
            restored.group(&[7; 16]).expect("group").epoch(),
            member.group(&[7; 16]).expect("group").epoch()
        );
    }

    #[test]
    fn test_restored_member_still_decrypts() {
        let mut alice = Member::create("alice");
        alice.create_group([7; 16], 4, true);
        let ciphertext = alice.encrypt_for_group(&[7; 16], b"before save").expect("encrypt");

        let secret = [0x55u8; 32];
        let sealed = seal_member(&alice, &secret).expect("seal");
        let restored = open_member(&sealed, &secret).expect("open");

        assert_eq!(restored.decrypt(&ciphertext).expect("decrypt"), b"before save");
    }

    #[test]
    fn test_wrong_device_secret_rejected() {
        let member = Member::create("alice");
        let sealed = seal_member(&member, &[1u8; 32]).expect("seal");
        assert!(open_member(&sealed, &[2u8; 32]).is_err());
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let member = Member::create("alice");
        let sealed = seal_member(&member, &[1u8; 32]).expect("seal");
        assert!(open_member(&sealed[..10], &[1u8; 32]).is_err());
    }
}
