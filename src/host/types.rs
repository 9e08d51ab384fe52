//! Instance manager type definitions

use crate::error::HostError;
use crate::platform::{ComponentDescription, InstanceId, PluginInstance, UiSurface};
use crate::state::StateCollection;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Discovery wait bound when the component is not registered yet
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Map from live instance to its editor view (if it has one)
pub type SurfaceMap = HashMap<InstanceId, Option<UiSurface>>;

/// One live plugin instance; slot index = position in the live list
#[derive(Clone)]
pub struct HostedInstance {
    pub id: InstanceId,
    pub plugin: Arc<dyn PluginInstance>,
}

impl fmt::Debug for HostedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedInstance")
            .field("id", &self.id)
            .field("name", &self.plugin.name())
            .finish()
    }
}

/// Outcome of the last instance-count reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Live set matches the requested count
    Idle,
    /// Discovery or an instantiation failed; the next count change retries
    Failed,
}

/// Static parameters of the instance manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// The one plugin type this host replicates
    pub component: ComponentDescription,
    /// Instance count to reach right after discovery
    pub initial_instance_count: usize,
    pub discovery_timeout: Duration,
    /// Treat a plugin without editor as a failure (`NilUiSurface`)
    pub require_ui_surface: bool,
}

impl ManagerConfig {
    pub fn new(component: ComponentDescription) -> Self {
        Self {
            component,
            initial_instance_count: 1,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            require_ui_surface: false,
        }
    }
}

/// Notification produced on the control task, delivered on the
/// presentation task
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Live set settled; instances in slot order
    Connected {
        instances: Vec<HostedInstance>,
        surfaces: SurfaceMap,
    },
    /// Terminal failure of one discovery/instantiation attempt
    Failed(HostError),
    /// A state capture completed
    StateCaptured(StateCollection),
}

/// Receiver of instance manager notifications
///
/// Held weakly by the manager; callbacks always run on the presentation
/// task, never on the caller's task.
pub trait HostObserver: Send + Sync {
    fn on_connected(&self, instances: &[HostedInstance], surfaces: &SurfaceMap);

    fn on_failed(&self, error: &HostError);

    /// Default: ignore captures
    fn on_state_captured(&self, _collection: &StateCollection) {}
}

/// Observer that forwards every notification into a channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl HostObserver for ChannelObserver {
    fn on_connected(&self, instances: &[HostedInstance], surfaces: &SurfaceMap) {
        let _ = self.tx.send(HostEvent::Connected {
            instances: instances.to_vec(),
            surfaces: surfaces.clone(),
        });
    }

    fn on_failed(&self, error: &HostError) {
        let _ = self.tx.send(HostEvent::Failed(error.clone()));
    }

    fn on_state_captured(&self, collection: &StateCollection) {
        let _ = self.tx.send(HostEvent::StateCaptured(collection.clone()));
    }
}
