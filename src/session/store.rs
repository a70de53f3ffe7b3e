//! Session store adapters.
//!
//! The pipeline only consumes the [`SessionStore`] contract: load an
//! opaque blob by token, save a new blob under a token. No transactional
//! guarantee exists between a load and a save of the same token across
//! concurrent calls; the store retains whichever save lands last.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::RwLock;
use thiserror::Error;

use super::SessionToken;
use crate::storage::write_atomic;

/// Failure in a session store operation. Both directions are absorbed by
/// the pipeline: load failures degrade to a fresh session, save failures
/// to a stale one.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Token cannot be used as a storage key.
    #[error("invalid session token '{0}'")]
    InvalidToken(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Abstract key→blob persistence keyed by session token.
pub trait SessionStore: Send + Sync {
    /// Fetch the blob persisted for a token, if any.
    fn load(&self, token: &SessionToken) -> Result<Option<Vec<u8>>, StoreError>;

    /// Persist a fresh blob for a token, replacing any previous one.
    fn save(&self, token: &SessionToken, blob: &[u8]) -> Result<(), StoreError>;
}

/// In-process store backed by a map. State lives as long as the service
/// process; suitable for tests and single-node deployments.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with persisted state.
    pub fn session_count(&self) -> usize {
        self.blobs.read().len()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, token: &SessionToken) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.read().get(token.as_str()).cloned())
    }

    fn save(&self, token: &SessionToken, blob: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .write()
            .insert(token.as_str().to_string(), blob.to_vec());
        Ok(())
    }
}

/// Durable store keeping one blob file per token under a root directory.
///
/// Saves are atomic (temp file + rename + fsync), so a crash mid-save
/// leaves the previous blob intact.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a file store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory holding the blob files.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn blob_path(&self, token: &SessionToken) -> Result<PathBuf, StoreError> {
        let raw = token.as_str();
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidToken(raw.to_string()));
        }
        Ok(self.root.join(format!("{raw}.state")))
    }
}

impl SessionStore for FileStore {
    fn load(&self, token: &SessionToken) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(token)?;
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, token: &SessionToken, blob: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(token)?;
        write_atomic(&path, blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let token = SessionToken::new("abc");

        assert!(store.load(&token).unwrap().is_none());
        store.save(&token, b"blob-1").unwrap();
        assert_eq!(store.load(&token).unwrap().unwrap(), b"blob-1");

        store.save(&token, b"blob-2").unwrap();
        assert_eq!(store.load(&token).unwrap().unwrap(), b"blob-2");
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path().join("sessions")).unwrap();
        let token = SessionToken::new("session-1");

        assert!(store.load(&token).unwrap().is_none());
        store.save(&token, b"blob").unwrap();
        assert_eq!(store.load(&token).unwrap().unwrap(), b"blob");
    }

    #[test]
    fn file_store_rejects_path_escaping_tokens() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        for bad in ["", "../sneaky", "a/b", ".hidden"] {
            let token = SessionToken::new(bad);
            assert!(matches!(
                store.save(&token, b"blob"),
                Err(StoreError::InvalidToken(_))
            ));
        }
    }
}
