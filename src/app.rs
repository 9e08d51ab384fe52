//! Host session - ties the instance manager, the preset store and playback
//! together
//!
//! Saving a preset captures every instance's state and stores it; loading
//! one applies it back by slot. The session also remembers the last
//! requested instance count so the next launch starts with it.

use crate::error::{SessionError, StoreError};
use crate::host::{HostedInstance, InstanceManagerHandle};
use crate::playback::PlaybackDriver;
use crate::state::{BlobStore, Preset, PresetId, PresetStore, StateMap};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Persisted between launches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub instance_count: usize,
}

/// Read the saved session record; unreadable records are ignored
pub fn restore_session(backend: &dyn BlobStore) -> Option<SessionRecord> {
    let blob = backend.restore()?;
    match serde_json::from_slice(&blob) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Ignoring unreadable session record: {}", e);
            None
        }
    }
}

pub struct HostSession {
    manager: InstanceManagerHandle,
    presets: Mutex<PresetStore>,
    playback: Arc<PlaybackDriver>,
    session: Mutex<Box<dyn BlobStore>>,
}

impl HostSession {
    pub fn new(
        manager: InstanceManagerHandle,
        presets: PresetStore,
        playback: Arc<PlaybackDriver>,
        session: Box<dyn BlobStore>,
    ) -> Self {
        Self {
            manager,
            presets: Mutex::new(presets),
            playback,
            session: Mutex::new(session),
        }
    }

    pub fn manager(&self) -> &InstanceManagerHandle {
        &self.manager
    }

    pub fn playback(&self) -> &Arc<PlaybackDriver> {
        &self.playback
    }

    /// Request `count` instances and remember it for the next launch
    pub fn set_instance_count(&self, count: usize) {
        self.manager.set_instance_count(count);

        let record = SessionRecord {
            instance_count: count,
        };
        match serde_json::to_vec(&record) {
            Ok(blob) => self.session.lock().save(&blob),
            Err(e) => warn!("Failed to serialize session record: {}", e),
        }
    }

    pub async fn instances(&self) -> Vec<HostedInstance> {
        self.manager.instances().await
    }

    /// Capture the current state of every instance into a new preset
    pub async fn save_preset(&self, name: &str) -> Result<PresetId, SessionError> {
        let collection = self.manager.capture_all_state().await?;

        let mut presets = self.presets.lock();
        let id = presets.create(name);
        presets.set_state_collection(id, collection);
        info!(%id, name, "Preset saved");
        Ok(id)
    }

    /// Replace the state of the preset at `index` with a fresh capture
    pub async fn overwrite_preset(&self, index: usize) -> Result<PresetId, SessionError> {
        self.check_index(index)?;
        let collection = self.manager.capture_all_state().await?;

        let mut presets = self.presets.lock();
        // The store may have changed while the capture was in flight
        let id = presets.id_at(index).ok_or(StoreError::IndexOutOfRange {
            index,
            len: presets.len(),
        })?;
        presets.set_state_collection(id, collection);
        info!(%id, index, "Preset overwritten");
        Ok(id)
    }

    /// Apply the preset at `index` to the live instances by slot
    ///
    /// Returns how many instances received state.
    pub async fn load_preset(&self, index: usize) -> Result<usize, SessionError> {
        let collection = {
            let presets = self.presets.lock();
            if index >= presets.len() {
                return Err(StoreError::IndexOutOfRange {
                    index,
                    len: presets.len(),
                }
                .into());
            }
            presets.state_collection(index)
        };

        let applied = self.manager.apply_state_collection(collection).await?;
        info!(index, applied, "Preset loaded");
        Ok(applied)
    }

    pub fn delete_preset(&self, index: usize) -> Result<Preset, SessionError> {
        let preset = self.presets.lock().delete(index)?;
        info!(id = %preset.id, name = %preset.name, "Preset deleted");
        Ok(preset)
    }

    /// Presets in display order
    pub fn presets(&self) -> Vec<(PresetId, String)> {
        self.presets.lock().list()
    }

    /// Current state of the instance in `slot`, if it has any
    pub async fn instance_state(&self, slot: usize) -> Result<Option<StateMap>, SessionError> {
        let mut collection = self.manager.capture_all_state().await?;
        let live = collection.len();
        if slot >= live {
            return Err(SessionError::NoSuchSlot { slot, live });
        }
        Ok(collection.swap_remove(slot))
    }

    pub async fn start_playback(&self) -> usize {
        let instances = self.manager.instances().await;
        self.playback.start(&instances)
    }

    pub fn stop_playback(&self) {
        self.playback.stop();
    }

    pub async fn toggle_playback(&self) -> bool {
        let instances = self.manager.instances().await;
        self.playback.toggle(&instances)
    }

    /// One base note on the instance in `slot`
    pub async fn play_once(&self, slot: usize) -> Result<JoinHandle<()>, SessionError> {
        let instances = self.manager.instances().await;
        let instance = instances.get(slot).ok_or(SessionError::NoSuchSlot {
            slot,
            live: instances.len(),
        })?;
        Ok(self.playback.play_once(instance))
    }

    pub fn shutdown(&self) {
        debug!("Shutting down host session");
        self.playback.stop();
        self.manager.shutdown();
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        let len = self.presets.lock().len();
        if index >= len {
            return Err(StoreError::IndexOutOfRange { index, len });
        }
        Ok(())
    }
}
