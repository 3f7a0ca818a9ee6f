//! File-backed secret store.
//!
//! Two opaque values live here: the random device secret and the
//! AES-GCM-sealed member blob. Writes go to a tempfile in the same
//! directory and rename into place, so a crash mid-write leaves the
//! previous value intact.

use std::path::{Path, PathBuf};

use amigo_cgka::member::Member;
use amigo_cgka::persist;
use rand::RngCore;

/// Key for the sealed member blob.
const MEMBER_KEY: &str = "member";

/// Key for the device secret.
const DEVICE_SECRET_KEY: &str = "device_secret";

/// A directory of atomically replaced secret files.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Read a value, `None` if absent.
    pub fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.dir.join(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a value atomically: tempfile in the same directory, then
    /// rename over the destination.
    pub fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let path = self.dir.join(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Delete a value. Absent keys are fine.
    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        let path = self.dir.join(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The device secret, generated on first use.
    pub fn device_secret(&self) -> anyhow::Result<[u8; 32]> {
        if let Some(bytes) = self.get(DEVICE_SECRET_KEY)? {
            let secret: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("device secret has wrong length"))?;
            return Ok(secret);
        }
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        self.set(DEVICE_SECRET_KEY, &secret)?;
        Ok(secret)
    }

    /// Load the persisted member, or create and persist a fresh one.
    pub fn load_or_create_member(
        &self,
        pseudonym: &str,
        device_secret: &[u8; 32],
    ) -> anyhow::Result<Member> {
        if let Some(blob) = self.get(MEMBER_KEY)? {
            let member = persist::open_member(&blob, device_secret)?;
            tracing::info!(member_id = member.member_id_hex(), "member restored");
            return Ok(member);
        }
        let member = Member::create(pseudonym);
        self.save_member(&member, device_secret)?;
        tracing::info!(member_id = member.member_id_hex(), "member created");
        Ok(member)
    }

    /// Seal and persist the member blob.
    pub fn save_member(&self, member: &Member, device_secret: &[u8; 32]) -> anyhow::Result<()> {
        let blob = persist::seal_member(member, device_secret)?;
        self.set(MEMBER_KEY, &blob)
    }

    /// Persist a pre-sealed member blob.
    pub fn save_member_blob(&self, blob: &[u8]) -> anyhow::Result<()> {
        self.set(MEMBER_KEY, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (FileSecretStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "amigo-secret-store-{}-{:x}",
            std::process::id(),
            rand::random::<u64>()
        ));
        (FileSecretStore::open(&dir).expect("open store"), dir)
    }

    #[test]
    fn test_get_set_delete() {
        let (store, dir) = temp_store();
        assert!(store.get("k").expect("get").is_none());
        store.set("k", b"value").expect("set");
        assert_eq!(store.get("k").expect("get").expect("some"), b"value");
        store.delete("k").expect("delete");
        assert!(store.get("k").expect("get").is_none());
        store.delete("k").expect("delete absent is fine");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_device_secret_stable() {
        let (store, dir) = temp_store();
        let first = store.device_secret().expect("secret");
        let second = store.device_secret().expect("secret");
        assert_eq!(first, second);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_member_roundtrip() {
        let (store, dir) = temp_store();
        let secret = store.device_secret().expect("secret");

        let created = store
            .load_or_create_member("alice", &secret)
            .expect("create");
        let restored = store
            .load_or_create_member("ignored", &secret)
            .expect("restore");
        assert_eq!(created.member_id(), restored.member_id());
        assert_eq!(restored.credential().pseudonym, "alice");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_no_tempfile_left_behind() {
        let (store, dir) = temp_store();
        store.set("k", b"value").expect("set");
        assert!(!dir.join("k.tmp").exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
