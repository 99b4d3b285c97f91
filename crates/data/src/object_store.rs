//! Object storage behind a capability trait. Metadata stays authoritative
//! in the database; the object itself may be transiently absent.

use std::path::PathBuf;

use async_trait::async_trait;
use px_domain::{Error, Result};
use sha2::{Digest, Sha256};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Content-addressed key: `ab/abcdef…` (sha-256 of the bytes).
pub fn content_key(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}/{}", &digest[..2], digest)
}

/// Filesystem-backed store rooted at a configured directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Keys are internally generated, but refuse traversal anyway.
        if key.contains("..") || key.starts_with('/') {
            return Err(Error::invalid_argument(format!("bad storage key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_shape() {
        let key = content_key(b"hello");
        assert_eq!(key.len(), 2 + 1 + 64);
        assert_eq!(&key[..2], &key[3..5]);
        assert_eq!(key, content_key(b"hello"));
        assert_ne!(key, content_key(b"world"));
    }

    #[tokio::test]
    async fn fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let key = content_key(b"payload");

        store.put(&key, b"payload").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(b"payload".to_vec()));

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        // Deleting again is a no-op.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.get("../etc/passwd").await.is_err());
    }
}
