// Durable session storage backends

use super::types::SealedSession;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// File name of the persisted envelope.
pub const SESSION_FILE: &str = "session.json";
/// File name of the persisted symmetric key.
pub const KEY_FILE: &str = "session.key";

/// Trait for durable session storage.
///
/// One envelope and one key per storage location, both under fixed names.
/// Concurrent writers (several portal instances sharing a location) are
/// last-write-wins; there is no conflict resolution.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load the symmetric key, if one was persisted
    async fn load_key(&self) -> Result<Option<Vec<u8>>, String>;

    /// Persist the symmetric key
    async fn store_key(&self, key: &[u8]) -> Result<(), String>;

    /// Load the persisted envelope, if any
    async fn load_envelope(&self) -> Result<Option<SealedSession>, String>;

    /// Persist an envelope, replacing any previous one
    async fn store_envelope(&self, envelope: &SealedSession) -> Result<(), String>;

    /// Remove the persisted envelope
    async fn remove_envelope(&self) -> Result<(), String>;
}

/// In-memory storage, for tests and ephemeral sessions
pub struct MemorySessionStorage {
    key: RwLock<Option<Vec<u8>>>,
    envelope: RwLock<Option<SealedSession>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self {
            key: RwLock::new(None),
            envelope: RwLock::new(None),
        }
    }
}

impl Default for MemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load_key(&self) -> Result<Option<Vec<u8>>, String> {
        Ok(self.key.read().await.clone())
    }

    async fn store_key(&self, key: &[u8]) -> Result<(), String> {
        *self.key.write().await = Some(key.to_vec());
        Ok(())
    }

    async fn load_envelope(&self) -> Result<Option<SealedSession>, String> {
        Ok(self.envelope.read().await.clone())
    }

    async fn store_envelope(&self, envelope: &SealedSession) -> Result<(), String> {
        *self.envelope.write().await = Some(envelope.clone());
        Ok(())
    }

    async fn remove_envelope(&self) -> Result<(), String> {
        *self.envelope.write().await = None;
        Ok(())
    }
}

/// File-backed storage: one directory holding the key and the envelope.
///
/// This is the durable store that lets a session survive process restarts.
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    async fn ensure_dir(&self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("failed to create storage dir '{}': {}", self.dir.display(), e))
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load_key(&self) -> Result<Option<Vec<u8>>, String> {
        match tokio::fs::read_to_string(self.key_path()).await {
            Ok(contents) => {
                let key = STANDARD
                    .decode(contents.trim())
                    .map_err(|e| format!("corrupt key file: {}", e))?;
                Ok(Some(key))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("failed to read key file: {}", e)),
        }
    }

    async fn store_key(&self, key: &[u8]) -> Result<(), String> {
        self.ensure_dir().await?;
        tokio::fs::write(self.key_path(), STANDARD.encode(key))
            .await
            .map_err(|e| format!("failed to write key file: {}", e))?;
        debug!("Persisted session key to {}", self.key_path().display());
        Ok(())
    }

    async fn load_envelope(&self) -> Result<Option<SealedSession>, String> {
        match tokio::fs::read_to_string(self.session_path()).await {
            Ok(contents) => {
                let envelope = serde_json::from_str(&contents)
                    .map_err(|e| format!("corrupt session file: {}", e))?;
                Ok(Some(envelope))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(format!("failed to read session file: {}", e)),
        }
    }

    async fn store_envelope(&self, envelope: &SealedSession) -> Result<(), String> {
        self.ensure_dir().await?;
        let contents = serde_json::to_string(envelope)
            .map_err(|e| format!("failed to serialize envelope: {}", e))?;
        tokio::fs::write(self.session_path(), contents)
            .await
            .map_err(|e| format!("failed to write session file: {}", e))
    }

    async fn remove_envelope(&self) -> Result<(), String> {
        match tokio::fs::remove_file(self.session_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to remove session file: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn envelope(payload: &str) -> SealedSession {
        SealedSession {
            captured_at: Utc::now(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_envelope_round_trip() {
        let storage = MemorySessionStorage::new();
        assert!(storage.load_envelope().await.unwrap().is_none());

        storage.store_envelope(&envelope("abc")).await.unwrap();
        let loaded = storage.load_envelope().await.unwrap().unwrap();
        assert_eq!(loaded.payload, "abc");

        storage.remove_envelope().await.unwrap();
        assert!(storage.load_envelope().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_key_round_trip() {
        let storage = MemorySessionStorage::new();
        assert!(storage.load_key().await.unwrap().is_none());

        storage.store_key(&[1, 2, 3]).await.unwrap();
        assert_eq!(storage.load_key().await.unwrap().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = FileSessionStorage::new(dir.path());
            storage.store_key(&[9u8; 32]).await.unwrap();
            storage.store_envelope(&envelope("persisted")).await.unwrap();
        }

        let reopened = FileSessionStorage::new(dir.path());
        assert_eq!(reopened.load_key().await.unwrap().unwrap(), vec![9u8; 32]);
        assert_eq!(
            reopened.load_envelope().await.unwrap().unwrap().payload,
            "persisted"
        );
    }

    #[tokio::test]
    async fn test_file_storage_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());

        assert!(storage.load_key().await.unwrap().is_none());
        assert!(storage.load_envelope().await.unwrap().is_none());
        // Removing an absent envelope is not an error
        storage.remove_envelope().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_storage_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileSessionStorage::new(dir.path());
        let b = FileSessionStorage::new(dir.path());

        a.store_envelope(&envelope("from-a")).await.unwrap();
        b.store_envelope(&envelope("from-b")).await.unwrap();

        assert_eq!(a.load_envelope().await.unwrap().unwrap().payload, "from-b");
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_session_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path());

        tokio::fs::write(dir.path().join(SESSION_FILE), "not json")
            .await
            .unwrap();

        assert!(storage.load_envelope().await.is_err());
    }
}
