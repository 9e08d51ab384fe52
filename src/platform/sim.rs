//! In-process simulated platform
//!
//! Stands in for the operating system's component registry, instantiation
//! service and audio engine. The demo binary runs against it, and the test
//! suite uses its scripting hooks (delayed registration, scripted
//! instantiation failures, recorded routing and MIDI traffic).

use super::{
    AudioRouter, ComponentDescription, ComponentRegistry, InstanceId, Instantiator,
    PluginInstance, UiSurface,
};
use crate::error::PlatformError;
use crate::midi::MidiMessage;
use crate::state::{PropertyMap, PropertyValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

// ============================================================================
// Registry
// ============================================================================

/// Registry holding a mutable list of registered components
pub struct SimRegistry {
    components: Mutex<Vec<ComponentDescription>>,
    changes_tx: broadcast::Sender<()>,
    queries: AtomicUsize,
}

impl SimRegistry {
    pub fn new() -> Arc<Self> {
        let (changes_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            components: Mutex::new(Vec::new()),
            changes_tx,
            queries: AtomicUsize::new(0),
        })
    }

    /// Registry that already knows `description`
    pub fn with_component(description: ComponentDescription) -> Arc<Self> {
        let registry = Self::new();
        registry.components.lock().push(description);
        registry
    }

    /// Register a component and notify subscribers
    pub fn register(&self, description: ComponentDescription) {
        info!("Component registered: {}", description);
        self.components.lock().push(description);
        // No subscribers is fine
        let _ = self.changes_tx.send(());
    }

    /// Register after `delay`, modelling the plugin's first-launch
    /// registration racing the host's startup
    pub fn register_after(self: &Arc<Self>, description: ComponentDescription, delay: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.register(description);
        });
    }

    /// Fire a change notification without registering anything
    pub fn notify_unrelated_change(&self) {
        let _ = self.changes_tx.send(());
    }

    /// Number of `find_components` calls so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ComponentRegistry for SimRegistry {
    fn find_components(&self, description: &ComponentDescription) -> Vec<ComponentDescription> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.components
            .lock()
            .iter()
            .filter(|c| *c == description)
            .cloned()
            .collect()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<()> {
        self.changes_tx.subscribe()
    }
}

// ============================================================================
// Instantiator
// ============================================================================

/// Scripted result of one instantiation
#[derive(Debug, Clone)]
pub enum SimOutcome {
    /// A working plugin with an editor
    Ok,
    /// A working plugin without an editor
    NoUi,
    /// Success reported but no object delivered
    NilInstance,
    /// Platform failure
    Error(String),
    /// A working plugin whose editor request fails
    UiError(String),
}

/// Instantiator producing [`SimPlugin`]s
pub struct SimInstantiator {
    script: Mutex<VecDeque<SimOutcome>>,
    latency: Duration,
    initial_state: Mutex<PropertyMap>,
    created: Mutex<Vec<Arc<SimPlugin>>>,
    calls: AtomicUsize,
}

impl SimInstantiator {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::ZERO)
    }

    /// Each instantiation (and UI request) suspends for `latency`
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            latency,
            initial_state: Mutex::new(default_state()),
            created: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queue outcomes for the next instantiations; once drained every call
    /// yields [`SimOutcome::Ok`]
    pub fn script(&self, outcomes: impl IntoIterator<Item = SimOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// State every new plugin starts with
    pub fn set_initial_state(&self, state: PropertyMap) {
        *self.initial_state.lock() = state;
    }

    /// Every plugin created so far, in creation order
    pub fn created(&self) -> Vec<Arc<SimPlugin>> {
        self.created.lock().clone()
    }

    /// Number of `instantiate` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Instantiator for SimInstantiator {
    async fn instantiate(
        &self,
        description: &ComponentDescription,
    ) -> Result<Option<Arc<dyn PluginInstance>>, PlatformError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self.script.lock().pop_front().unwrap_or(SimOutcome::Ok);
        debug!(call, ?outcome, "Simulated instantiation of {}", description);

        let (has_ui, ui_error) = match outcome {
            SimOutcome::Ok => (true, None),
            SimOutcome::NoUi => (false, None),
            SimOutcome::NilInstance => return Ok(None),
            SimOutcome::Error(message) => return Err(PlatformError::new(message)),
            SimOutcome::UiError(message) => (true, Some(message)),
        };

        let plugin = Arc::new(SimPlugin::new(
            format!("{} {}", description.subtype, call),
            self.initial_state.lock().clone(),
            has_ui,
            self.latency,
        ));
        if let Some(message) = ui_error {
            plugin.fail_ui_requests(message);
        }
        self.created.lock().push(Arc::clone(&plugin));
        Ok(Some(plugin as Arc<dyn PluginInstance>))
    }
}

fn default_state() -> PropertyMap {
    let mut state = PropertyMap::new();
    state.insert("gain".to_string(), PropertyValue::Float(0.8));
    state.insert("cutoff".to_string(), PropertyValue::Double(1200.0));
    state.insert("program".to_string(), PropertyValue::Integer(0));
    state.insert(
        "patch".to_string(),
        PropertyValue::String("Init".to_string()),
    );
    state.insert(
        "data".to_string(),
        PropertyValue::Data(vec![0x00, 0x10, 0x20, 0x30]),
    );
    state
}

// ============================================================================
// Plugin
// ============================================================================

/// Simulated plugin: holds a property map and records received MIDI
pub struct SimPlugin {
    name: String,
    state: Mutex<Option<PropertyMap>>,
    has_ui: bool,
    ui_error: Mutex<Option<String>>,
    latency: Duration,
    midi: Mutex<Vec<MidiMessage>>,
    ui_requests: AtomicUsize,
}

impl SimPlugin {
    pub fn new(name: String, state: PropertyMap, has_ui: bool, latency: Duration) -> Self {
        Self {
            name,
            state: Mutex::new(Some(state)),
            has_ui,
            ui_error: Mutex::new(None),
            latency,
            midi: Mutex::new(Vec::new()),
            ui_requests: AtomicUsize::new(0),
        }
    }

    /// Make every later UI surface request fail with `message`
    pub fn fail_ui_requests(&self, message: impl Into<String>) {
        *self.ui_error.lock() = Some(message.into());
    }

    /// Make the plugin yield no state at all
    pub fn clear_state(&self) {
        *self.state.lock() = None;
    }

    /// Set one state entry directly
    pub fn set_param(&self, key: &str, value: PropertyValue) {
        self.state
            .lock()
            .get_or_insert_with(PropertyMap::new)
            .insert(key.to_string(), value);
    }

    pub fn param(&self, key: &str) -> Option<PropertyValue> {
        self.state.lock().as_ref().and_then(|s| s.get(key).cloned())
    }

    /// MIDI messages received so far
    pub fn received_midi(&self) -> Vec<MidiMessage> {
        self.midi.lock().clone()
    }

    pub fn ui_request_count(&self) -> usize {
        self.ui_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginInstance for SimPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_ui_surface(&self) -> Result<Option<UiSurface>, PlatformError> {
        self.ui_requests.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(message) = self.ui_error.lock().clone() {
            return Err(PlatformError::new(message));
        }
        Ok(self.has_ui.then(|| UiSurface {
            title: self.name.clone(),
            width: 480,
            height: 320,
        }))
    }

    fn full_state(&self) -> Option<PropertyMap> {
        self.state.lock().clone()
    }

    fn set_full_state(&self, state: PropertyMap) {
        trace!(plugin = %self.name, keys = state.len(), "State replaced");
        *self.state.lock() = Some(state);
    }

    fn send_midi(&self, data: &[u8]) {
        if let Some(message) = MidiMessage::parse(data) {
            trace!(plugin = %self.name, %message, "MIDI received");
            self.midi.lock().push(message);
        }
    }
}

// ============================================================================
// Audio router
// ============================================================================

/// Routing operations observed by [`SimAudioRouter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterEvent {
    Connected(InstanceId),
    Disconnected(InstanceId),
    Started,
    Stopped,
}

/// Audio graph that records every operation
#[derive(Default)]
pub struct SimAudioRouter {
    running: AtomicBool,
    connected: Mutex<Vec<InstanceId>>,
    events: Mutex<Vec<RouterEvent>>,
    fail_connect: AtomicBool,
}

impl SimAudioRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every operation so far, in order
    pub fn events(&self) -> Vec<RouterEvent> {
        self.events.lock().clone()
    }

    /// Instances currently attached to the graph
    pub fn connected(&self) -> Vec<InstanceId> {
        self.connected.lock().clone()
    }

    /// Make subsequent `connect` calls fail
    pub fn fail_connections(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

impl AudioRouter for SimAudioRouter {
    fn connect(&self, id: InstanceId, plugin: &Arc<dyn PluginInstance>) -> Result<(), PlatformError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PlatformError::new(format!(
                "cannot attach '{}' to the graph",
                plugin.name()
            )));
        }
        self.connected.lock().push(id);
        self.events.lock().push(RouterEvent::Connected(id));
        Ok(())
    }

    fn disconnect(&self, id: InstanceId) {
        self.connected.lock().retain(|c| *c != id);
        self.events.lock().push(RouterEvent::Disconnected(id));
    }

    fn start(&self) -> Result<(), PlatformError> {
        self.running.store(true, Ordering::SeqCst);
        self.events.lock().push(RouterEvent::Started);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.events.lock().push(RouterEvent::Stopped);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FourCharCode;

    fn desc() -> ComponentDescription {
        ComponentDescription {
            component_type: FourCharCode::new(b"aumu"),
            subtype: FourCharCode::new(b"demo"),
            manufacturer: FourCharCode::new(b"Acme"),
        }
    }

    #[tokio::test]
    async fn test_registry_notifies_on_register() {
        let registry = SimRegistry::new();
        let mut changes = registry.subscribe_changes();
        assert!(registry.find_components(&desc()).is_empty());

        registry.register(desc());
        changes.recv().await.unwrap();
        assert_eq!(registry.find_components(&desc()), vec![desc()]);
        assert_eq!(registry.query_count(), 2);
    }

    #[tokio::test]
    async fn test_instantiator_follows_script() {
        let instantiator = SimInstantiator::new();
        instantiator.script([
            SimOutcome::NilInstance,
            SimOutcome::Error("boom".to_string()),
            SimOutcome::NoUi,
            SimOutcome::UiError("no view".to_string()),
        ]);

        assert!(instantiator.instantiate(&desc()).await.unwrap().is_none());
        assert_eq!(
            instantiator.instantiate(&desc()).await.err(),
            Some(PlatformError::new("boom"))
        );
        let plugin = instantiator.instantiate(&desc()).await.unwrap().unwrap();
        assert!(plugin.request_ui_surface().await.unwrap().is_none());

        let plugin = instantiator.instantiate(&desc()).await.unwrap().unwrap();
        assert_eq!(
            plugin.request_ui_surface().await.err(),
            Some(PlatformError::new("no view"))
        );

        let plugin = instantiator.instantiate(&desc()).await.unwrap().unwrap();
        assert!(plugin.request_ui_surface().await.unwrap().is_some());
        assert_eq!(instantiator.created().len(), 3);
    }

    #[test]
    fn test_plugin_records_midi() {
        let plugin = SimPlugin::new("p".to_string(), PropertyMap::new(), true, Duration::ZERO);
        plugin.send_midi(&[0x90, 60, 100]);
        plugin.send_midi(&[0x80, 60, 0]);
        plugin.send_midi(&[0xFE]); // ignored
        assert_eq!(plugin.received_midi().len(), 2);
    }

    #[test]
    fn test_router_records_operations() {
        let router = SimAudioRouter::new();
        let plugin: Arc<dyn PluginInstance> = Arc::new(SimPlugin::new(
            "p".to_string(),
            PropertyMap::new(),
            true,
            Duration::ZERO,
        ));
        router.start().unwrap();
        router.connect(InstanceId(1), &plugin).unwrap();
        router.disconnect(InstanceId(1));
        assert_eq!(
            router.events(),
            vec![
                RouterEvent::Started,
                RouterEvent::Connected(InstanceId(1)),
                RouterEvent::Disconnected(InstanceId(1)),
            ]
        );
        assert!(router.connected().is_empty());
        assert!(router.is_running());
    }
}
