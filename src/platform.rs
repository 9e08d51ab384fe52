//! Platform collaborators: component registry, instantiation, UI surfaces
//! and the audio routing graph
//!
//! The host never talks to the operating system directly. Everything it
//! needs from the platform goes through the traits below, so a real Audio
//! Unit binding and the in-process simulation in [`sim`] are
//! interchangeable.
//!
//! Note: All methods take `&self` so implementations can be shared as
//! `Arc<dyn ..>`; use interior mutability for any state.

pub mod sim;

use crate::error::PlatformError;
use crate::state::PropertyMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Four-character code used in component descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCharCode(pub [u8; 4]);

impl FourCharCode {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Get the FourCC as a 32-bit value (big-endian)
    pub const fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl TryFrom<String> for FourCharCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = value.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii()) {
            return Err(format!(
                "four-char code must be exactly 4 ASCII characters, got '{}'",
                value
            ));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl From<FourCharCode> for String {
    fn from(code: FourCharCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for FourCharCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one plugin type in the platform registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentDescription {
    pub component_type: FourCharCode,
    pub subtype: FourCharCode,
    pub manufacturer: FourCharCode,
}

impl fmt::Display for ComponentDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.component_type, self.subtype, self.manufacturer
        )
    }
}

/// Host-assigned identity of a live instance (monotonic, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a plugin's editor view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSurface {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Platform registry lookup
pub trait ComponentRegistry: Send + Sync {
    /// Registered components matching `description`
    fn find_components(&self, description: &ComponentDescription) -> Vec<ComponentDescription>;

    /// Fires whenever the set of registered components changes
    fn subscribe_changes(&self) -> broadcast::Receiver<()>;
}

/// Asynchronous instantiation primitive
#[async_trait]
pub trait Instantiator: Send + Sync {
    /// `Ok(None)` means the platform reported success without an object
    async fn instantiate(
        &self,
        description: &ComponentDescription,
    ) -> Result<Option<Arc<dyn PluginInstance>>, PlatformError>;
}

/// One running plugin object
#[async_trait]
pub trait PluginInstance: Send + Sync {
    /// Display name reported by the plugin
    fn name(&self) -> &str;

    /// Request the editor view; `Ok(None)` = plugin has no UI
    async fn request_ui_surface(&self) -> Result<Option<UiSurface>, PlatformError>;

    /// Full opaque state, `None` if the plugin yields none
    fn full_state(&self) -> Option<PropertyMap>;

    /// Replace the full opaque state
    fn set_full_state(&self, state: PropertyMap);

    /// Schedule a MIDI event for immediate delivery
    fn send_midi(&self, data: &[u8]);
}

/// Audio graph owned by the playback engine
///
/// Only the instance manager's control task mutates the graph.
pub trait AudioRouter: Send + Sync {
    fn connect(&self, id: InstanceId, plugin: &Arc<dyn PluginInstance>) -> Result<(), PlatformError>;
    fn disconnect(&self, id: InstanceId);
    fn start(&self) -> Result<(), PlatformError>;
    fn stop(&self);
    fn is_running(&self) -> bool;
}

/// Bundle of platform collaborators handed to the instance manager
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn ComponentRegistry>,
    pub instantiator: Arc<dyn Instantiator>,
    pub router: Arc<dyn AudioRouter>,
}
