//! Preset records and identity generation

use super::types::StateCollection;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique preset identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetId(pub Uuid);

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named snapshot of every instance's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub id: PresetId,
    pub state_collection: StateCollection,
}

impl Preset {
    pub fn new(id: PresetId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            state_collection: StateCollection::new(),
        }
    }
}

/// Source of fresh preset identities
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> PresetId;
}

/// Random v4 identities
#[derive(Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> PresetId {
        PresetId(Uuid::new_v4())
    }
}

/// Deterministic identities `00000000-..-0001`, `..-0002`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: u128,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after `last`, e.g. when reopening a store in tests
    pub fn starting_after(last: u128) -> Self {
        Self { counter: last }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&mut self) -> PresetId {
        self.counter += 1;
        PresetId(Uuid::from_u128(self.counter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_are_deterministic() {
        let mut gen = SequentialIdGenerator::new();
        assert_eq!(gen.next_id(), PresetId(Uuid::from_u128(1)));
        assert_eq!(gen.next_id(), PresetId(Uuid::from_u128(2)));
    }

    #[test]
    fn test_preset_json_shape() {
        let preset = Preset::new(PresetId(Uuid::from_u128(1)), "Init");
        let json = serde_json::to_value(&preset).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Init",
                "id": "00000000-0000-0000-0000-000000000001",
                "stateCollection": []
            })
        );
    }
}
