//! Blob persistence for the preset store
//!
//! The preset store serializes itself into one opaque blob and hands it to a
//! [`BlobStore`]. Two backends are provided: [`SledBlobStore`] keeps the blob
//! under a fixed key in an embedded sled database, [`MemoryBlobStore`] keeps
//! it in memory (tests, ephemeral sessions).

use super::preset::Preset;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Key used for the preset document in sled
pub const PRESETS_KEY: &[u8] = b"presets";

/// Key used for the session record (last instance count) in sled
pub const SESSION_KEY: &[u8] = b"session";

/// Storage backend for a single serialized blob
///
/// Failures are the backend's own business: the preset store never surfaces
/// storage errors to its caller, so implementations log and move on.
pub trait BlobStore: Send {
    fn save(&mut self, blob: &[u8]);
    fn restore(&self) -> Option<Vec<u8>>;
    fn clear(&mut self);
}

/// Blob store backed by one key of an embedded sled database
pub struct SledBlobStore {
    db: sled::Db,
    key: Vec<u8>,
}

impl SledBlobStore {
    /// Open (or create) the database at `path` and bind to `key`
    pub fn open(path: impl AsRef<std::path::Path>, key: &[u8]) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open sled database at: {}", path.display()))?;
        debug!("Blob store opened at: {}", path.display());
        Ok(Self::with_db(db, key))
    }

    /// Bind to `key` of an already opened database
    ///
    /// sled handles are cheap to clone, so several stores can share one db.
    pub fn with_db(db: sled::Db, key: &[u8]) -> Self {
        Self {
            db,
            key: key.to_vec(),
        }
    }
}

impl BlobStore for SledBlobStore {
    fn save(&mut self, blob: &[u8]) {
        let result = self
            .db
            .insert(&self.key, blob)
            .and_then(|_| self.db.flush().map(|_| ()));
        match result {
            Ok(()) => trace!(bytes = blob.len(), "Blob written to sled"),
            Err(e) => error!("Failed to write blob to sled: {}", e),
        }
    }

    fn restore(&self) -> Option<Vec<u8>> {
        match self.db.get(&self.key) {
            Ok(Some(data)) => Some(data.to_vec()),
            Ok(None) => {
                debug!("No blob found in database");
                None
            }
            Err(e) => {
                error!("Failed to read blob from sled: {}", e);
                None
            }
        }
    }

    fn clear(&mut self) {
        if let Err(e) = self.db.remove(&self.key).and_then(|_| self.db.flush().map(|_| ())) {
            error!("Failed to clear blob in sled: {}", e);
        }
    }
}

/// In-memory blob store
///
/// Clones share the same slot, so a test can keep one clone to inspect what
/// the preset store wrote, or hand a clone to a second store to simulate a
/// restart.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store, e.g. with a corrupt blob
    pub fn with_blob(blob: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    /// Current raw contents
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.slot.lock().clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn save(&mut self, blob: &[u8]) {
        *self.slot.lock() = Some(blob.to_vec());
    }

    fn restore(&self) -> Option<Vec<u8>> {
        self.slot.lock().clone()
    }

    fn clear(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Serialize the preset list into the stable document shape
///
/// `[{"name": .., "id": .., "stateCollection": [tree | null, ..]}, ..]`
pub fn serialize_presets(presets: &[Preset]) -> Result<Vec<u8>> {
    serde_json::to_vec(presets).context("Failed to serialize preset document")
}

/// Parse a preset document produced by [`serialize_presets`]
pub fn deserialize_presets(blob: &[u8]) -> Result<Vec<Preset>> {
    serde_json::from_slice(blob).context("Failed to parse preset document")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_shares_slot_between_clones() {
        let mut store = MemoryBlobStore::new();
        let observer = store.clone();
        assert!(store.restore().is_none());

        store.save(b"abc");
        assert_eq!(observer.contents(), Some(b"abc".to_vec()));

        store.clear();
        assert!(observer.restore().is_none());
    }

    #[test]
    fn test_sled_store_save_restore_clear() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("test.sled");

        let mut store = SledBlobStore::open(&db_path, PRESETS_KEY).unwrap();
        assert!(store.restore().is_none());

        store.save(b"[1,2,3]");
        assert_eq!(store.restore(), Some(b"[1,2,3]".to_vec()));

        store.clear();
        assert!(store.restore().is_none());
    }

    #[test]
    fn test_sled_keys_are_independent() {
        let temp = tempdir().unwrap();
        let db = sled::open(temp.path().join("shared.sled")).unwrap();

        let mut presets = SledBlobStore::with_db(db.clone(), PRESETS_KEY);
        let mut session = SledBlobStore::with_db(db, SESSION_KEY);

        presets.save(b"p");
        session.save(b"s");
        presets.clear();

        assert!(presets.restore().is_none());
        assert_eq!(session.restore(), Some(b"s".to_vec()));
    }

    #[test]
    fn test_empty_document_round_trip() {
        let blob = serialize_presets(&[]).unwrap();
        assert_eq!(blob, b"[]");
        assert!(deserialize_presets(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(deserialize_presets(b"{not json").is_err());
    }
}
