//! PresetStore - ordered collection of named presets
//!
//! Insertion order is display order. Every mutation re-serializes the whole
//! collection and hands it to the blob store before returning. A corrupt or
//! missing blob on startup yields an empty store; it is never an error.

use super::persistence::{deserialize_presets, serialize_presets, BlobStore};
use super::preset::{IdGenerator, Preset, PresetId, UuidGenerator};
use super::types::StateCollection;
use crate::error::StoreError;
use anyhow::Result;
use tracing::{debug, info, warn};

/// Ordered, persisted collection of presets
pub struct PresetStore {
    presets: Vec<Preset>,
    backend: Box<dyn BlobStore>,
    ids: Box<dyn IdGenerator>,
    serialize: fn(&[Preset]) -> Result<Vec<u8>>,
}

impl PresetStore {
    /// Open a store over `backend` using random identities
    pub fn open(backend: impl BlobStore + 'static) -> Self {
        Self::with_id_generator(backend, UuidGenerator)
    }

    /// Open a store with an explicit identity source
    pub fn with_id_generator(
        backend: impl BlobStore + 'static,
        ids: impl IdGenerator + 'static,
    ) -> Self {
        let presets = match backend.restore() {
            Some(blob) => match deserialize_presets(&blob) {
                Ok(presets) => {
                    info!("Restored {} presets", presets.len());
                    presets
                }
                Err(e) => {
                    warn!("Discarding unreadable preset store: {:#}", e);
                    Vec::new()
                }
            },
            None => {
                debug!("No saved presets");
                Vec::new()
            }
        };

        Self {
            presets,
            backend: Box::new(backend),
            ids: Box::new(ids),
            serialize: serialize_presets,
        }
    }

    #[cfg(test)]
    fn set_serializer(&mut self, serialize: fn(&[Preset]) -> Result<Vec<u8>>) {
        self.serialize = serialize;
    }

    /// Append an empty preset and return its identity
    pub fn create(&mut self, name: impl Into<String>) -> PresetId {
        let id = self.fresh_id();
        let preset = Preset::new(id, name);
        debug!(%id, name = %preset.name, "Preset created");
        self.presets.push(preset);
        self.persist();
        id
    }

    /// `(id, name)` pairs in display order
    pub fn list(&self) -> Vec<(PresetId, String)> {
        self.presets
            .iter()
            .map(|p| (p.id, p.name.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Identity of the preset at a display position
    pub fn id_at(&self, index: usize) -> Option<PresetId> {
        self.presets.get(index).map(|p| p.id)
    }

    /// Remove the preset at a display position
    pub fn delete(&mut self, index: usize) -> Result<Preset, StoreError> {
        if index >= self.presets.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.presets.len(),
            });
        }
        let removed = self.presets.remove(index);
        debug!(id = %removed.id, index, "Preset deleted");
        self.persist();
        Ok(removed)
    }

    /// Overwrite the collection of the preset with `id`
    ///
    /// Returns false (and persists nothing) if no preset has that id.
    pub fn set_state_collection(&mut self, id: PresetId, collection: StateCollection) -> bool {
        let Some(preset) = self.presets.iter_mut().find(|p| p.id == id) else {
            debug!(%id, "No preset with this id, ignoring state update");
            return false;
        };
        preset.state_collection = collection;
        debug!(%id, slots = preset.state_collection.len(), "Preset state replaced");
        self.persist();
        true
    }

    /// Copy of the collection at a display position
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; callers validate against
    /// [`len`](Self::len) first.
    pub fn state_collection(&self, index: usize) -> StateCollection {
        self.presets[index].state_collection.clone()
    }

    fn fresh_id(&mut self) -> PresetId {
        loop {
            let id = self.ids.next_id();
            if !self.presets.iter().any(|p| p.id == id) {
                return id;
            }
            debug!(%id, "Generated preset id already in use, drawing another");
        }
    }

    /// Write the whole collection; on serialization failure clear instead
    fn persist(&mut self) {
        match (self.serialize)(&self.presets) {
            Ok(blob) => self.backend.save(&blob),
            Err(e) => {
                warn!("Clearing persisted presets: {:#}", e);
                self.backend.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::persistence::MemoryBlobStore;
    use crate::state::preset::SequentialIdGenerator;
    use crate::state::types::{StateMap, TypedValue};
    use uuid::Uuid;

    fn make_store(backend: &MemoryBlobStore) -> PresetStore {
        PresetStore::with_id_generator(backend.clone(), SequentialIdGenerator::new())
    }

    fn failing_serializer(_: &[Preset]) -> Result<Vec<u8>> {
        anyhow::bail!("value out of range")
    }

    fn make_state(gain: f32) -> StateMap {
        let mut map = StateMap::new();
        map.insert("gain".to_string(), TypedValue::Float(gain));
        map.insert("name".to_string(), TypedValue::String("Pad".to_string()));
        map.insert("blob".to_string(), TypedValue::Data(vec![1, 2, 3]));
        map
    }

    #[test]
    fn test_create_set_get_round_trip() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);

        let id = store.create("Warm");
        let collection = vec![Some(make_state(0.25)), None, Some(make_state(1.0))];
        assert!(store.set_state_collection(id, collection.clone()));

        assert_eq!(store.len(), 1);
        assert_eq!(store.state_collection(0), collection);
    }

    #[test]
    fn test_serialize_failure_clears_saved_blob() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        store.create("Kept");
        assert!(backend.contents().is_some());

        store.set_serializer(failing_serializer);
        store.create("Unsaveable");

        assert!(backend.contents().is_none());
        // In-memory collection is untouched
        assert_eq!(store.len(), 2);
        assert!(make_store(&backend).is_empty());
    }

    #[test]
    fn test_absent_entries_survive_restore() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        let id = store.create("Sparse");
        let collection = vec![None, Some(StateMap::new()), None];
        store.set_state_collection(id, collection.clone());

        let reopened = make_store(&backend);
        let restored = reopened.state_collection(0);
        assert_eq!(restored, collection);
        assert!(restored[0].is_none());
        assert_eq!(restored[1], Some(StateMap::new()));
    }

    #[test]
    fn test_delete_keeps_other_presets() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        let a = store.create("A");
        let b = store.create("B");
        let c = store.create("C");

        let removed = store.delete(1).unwrap();
        assert_eq!(removed.id, b);
        assert_eq!(
            store.list(),
            vec![(a, "A".to_string()), (c, "C".to_string())]
        );

        let reopened = make_store(&backend);
        assert_eq!(reopened.list(), store.list());
    }

    #[test]
    fn test_delete_out_of_range() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        store.create("Only");
        let before = backend.contents();

        let err = store.delete(5).unwrap_err();
        assert_eq!(err, StoreError::IndexOutOfRange { index: 5, len: 1 });
        assert_eq!(store.len(), 1);
        assert_eq!(backend.contents(), before);
    }

    #[test]
    fn test_set_unknown_id_is_noop() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        store.create("Known");
        let before = backend.contents();

        let unknown = PresetId(Uuid::from_u128(999));
        assert!(!store.set_state_collection(unknown, vec![None]));
        assert!(store.state_collection(0).is_empty());
        assert_eq!(backend.contents(), before);
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let backend = MemoryBlobStore::with_blob(b"\x00\x01 definitely not json".to_vec());
        let mut store = make_store(&backend);
        assert!(store.is_empty());

        // First mutation replaces the corrupt blob
        store.create("Fresh");
        let reopened = make_store(&backend);
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_every_mutation_persists() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        assert!(backend.contents().is_none());

        let id = store.create("P");
        let after_create = backend.contents().unwrap();

        store.set_state_collection(id, vec![Some(make_state(0.5))]);
        let after_set = backend.contents().unwrap();
        assert_ne!(after_create, after_set);

        store.delete(0).unwrap();
        assert_eq!(backend.contents().unwrap(), b"[]");
    }

    #[test]
    fn test_ids_stay_unique_across_reopen() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        let first = store.create("One");

        // Generator restarts at 1 and would collide with the restored preset
        let mut reopened = make_store(&backend);
        let second = reopened.create("Two");
        assert_ne!(first, second);
    }

    #[test]
    fn test_names_need_not_be_unique() {
        let backend = MemoryBlobStore::new();
        let mut store = make_store(&backend);
        let a = store.create("Same");
        let b = store.create("Same");
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.id_at(1), Some(b));
    }

    #[test]
    #[should_panic]
    fn test_state_collection_out_of_range_panics() {
        let backend = MemoryBlobStore::new();
        let store = make_store(&backend);
        let _ = store.state_collection(0);
    }
}
