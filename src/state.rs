//! Plugin state: typed value tree, codec and the persisted preset store
//!
//! A plugin hands out its full state as a loosely-typed property list. The
//! codec turns that into a closed [`TypedValue`] tree which the preset store
//! can serialize without losing numeric width or binary payloads.

pub mod codec;
pub mod persistence;
mod preset;
mod store;
mod types;

pub use codec::{decode, decode_state_map, encode, encode_state_map};
pub use persistence::{BlobStore, MemoryBlobStore, SledBlobStore, PRESETS_KEY, SESSION_KEY};
pub use preset::{IdGenerator, Preset, PresetId, SequentialIdGenerator, UuidGenerator};
pub use store::PresetStore;
pub use types::{PropertyMap, PropertyValue, StateCollection, StateMap, TypedValue};
