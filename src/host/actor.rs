//! InstanceActor - owns the live plugin instances
//!
//! All instance-list mutations, discovery and state capture/apply run on this
//! one task, one command at a time. That serialization is the only
//! synchronization the live list needs.
//!
//! # Growth
//!
//! ```text
//! instantiate ──▶ append ──▶ connect to router ──▶ request UI surface
//!      ▲                                                  │
//!      └──────────── below target? ◀──────────────────────┘
//!                         │ no
//!                         ▼
//!                  Connected event
//! ```
//!
//! Every count command reconciles to the most recently requested target,
//! not to the value it was queued with. Growth re-reads that target between
//! instantiations: a smaller request stops it early and the surplus is
//! pruned before the single `Connected` notification. Older commands still
//! in the queue then find the live count already settled and do nothing.

use super::actor_handle::InstanceManagerHandle;
use super::commands::HostCommand;
use super::discovery::discover;
use super::presentation;
use super::types::{HostEvent, HostObserver, HostedInstance, ManagerConfig, Phase, SurfaceMap};
use crate::error::HostError;
use crate::platform::{AudioRouter, ComponentDescription, InstanceId, Platform};
use crate::state::{decode_state_map, encode_state_map, StateCollection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

pub struct InstanceActor {
    config: ManagerConfig,
    platform: Platform,

    /// Resolved by discovery; `None` until a lookup succeeded
    component: Option<ComponentDescription>,

    /// Live instances in slot order
    instances: Vec<HostedInstance>,

    /// Editor views keyed by instance identity
    surfaces: SurfaceMap,

    next_id: u64,
    phase: Phase,

    /// Most recent target written by any handle
    latest_target: Arc<AtomicUsize>,

    command_rx: mpsc::UnboundedReceiver<HostCommand>,

    /// Presentation task inbox
    events_tx: mpsc::UnboundedSender<HostEvent>,
}

impl InstanceActor {
    /// Spawn the control task and its presentation task
    ///
    /// The actor runs discovery first, then grows to
    /// `config.initial_instance_count`.
    pub fn spawn(
        config: ManagerConfig,
        platform: Platform,
        observer: Weak<dyn HostObserver>,
    ) -> InstanceManagerHandle {
        let (cmd_tx, command_rx) = mpsc::unbounded_channel();
        let latest_target = Arc::new(AtomicUsize::new(config.initial_instance_count));
        let events_tx = presentation::spawn(observer);

        let actor = InstanceActor {
            config,
            platform,
            component: None,
            instances: Vec::new(),
            surfaces: SurfaceMap::new(),
            next_id: 1,
            phase: Phase::Idle,
            latest_target: Arc::clone(&latest_target),
            command_rx,
            events_tx,
        };

        tokio::spawn(actor.run());

        info!("InstanceActor spawned");

        InstanceManagerHandle::new(cmd_tx, latest_target)
    }

    async fn run(mut self) {
        debug!("InstanceActor run loop started");

        match discover(
            self.platform.registry.as_ref(),
            &self.config.component,
            self.config.discovery_timeout,
        )
        .await
        {
            Ok(component) => {
                self.component = Some(component);
                self.reconcile().await;
            }
            Err(e) => self.fail(e),
        }

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                HostCommand::SetInstanceCount { target } => {
                    debug!(requested = target, "Instance count requested");
                    self.reconcile().await;
                }
                HostCommand::CaptureAllState { response } => {
                    let result = self.handle_capture_all_state();
                    if let Ok(collection) = &result {
                        self.emit(HostEvent::StateCaptured(collection.clone()));
                    }
                    let _ = response.send(result);
                }
                HostCommand::ApplyStateCollection {
                    collection,
                    response,
                } => {
                    let applied = self.handle_apply_state_collection(collection);
                    if let Some(response) = response {
                        let _ = response.send(applied);
                    }
                }
                HostCommand::ListInstances { response } => {
                    let _ = response.send(self.instances.clone());
                }
                HostCommand::GetPhase { response } => {
                    let _ = response.send(self.phase);
                }
                HostCommand::Shutdown => {
                    info!("InstanceActor received shutdown command");
                    self.prune_to(0);
                    break;
                }
            }
        }

        info!(
            live = self.instances.len(),
            "InstanceActor run loop terminated"
        );
    }

    /// Latest target written by any handle
    fn latest_target(&self) -> usize {
        self.latest_target.load(Ordering::Acquire)
    }

    /// Reconcile the live list to the latest requested count
    async fn reconcile(&mut self) {
        let target = self.latest_target();
        let live = self.instances.len();

        if target == live {
            debug!(target, "Instance count already satisfied");
            return;
        }

        if target > live {
            if self.component.is_none() {
                // A user-driven count change is the manual retry after a
                // failed discovery
                match discover(
                    self.platform.registry.as_ref(),
                    &self.config.component,
                    self.config.discovery_timeout,
                )
                .await
                {
                    Ok(component) => self.component = Some(component),
                    Err(e) => {
                        self.fail(e);
                        return;
                    }
                }
            }

            info!(from = live, target, "Growing instance set");
            while self.instances.len() < self.latest_target() {
                if let Err(e) = self.add_instance().await {
                    self.fail(e);
                    return;
                }
            }
        }

        // Also drops instances a smaller request arrived for mid-growth
        let target = self.latest_target();
        if self.instances.len() > target {
            info!(from = self.instances.len(), target, "Pruning instance set");
            self.prune_to(target);
        }

        self.phase = Phase::Idle;
        self.emit_connected();
    }

    /// Instantiate, append, connect and fetch the UI surface of one instance
    async fn add_instance(&mut self) -> Result<(), HostError> {
        let component = self
            .component
            .clone()
            .ok_or_else(|| HostError::ComponentNotFound(self.config.component.to_string()))?;

        let plugin = self
            .platform
            .instantiator
            .instantiate(&component)
            .await?
            .ok_or(HostError::NilInstance)?;

        let id = InstanceId(self.next_id);
        self.next_id += 1;
        let instance = HostedInstance {
            id,
            plugin: Arc::clone(&plugin),
        };

        self.instances.push(instance);
        if let Err(e) = self.with_router_paused(|router| router.connect(id, &plugin)) {
            // Never keep an instance the router does not know about
            self.instances.pop();
            return Err(e.into());
        }
        debug!(instance = %id, name = plugin.name(), "Instance connected");

        let surface = match plugin.request_ui_surface().await {
            Ok(surface) => surface,
            Err(e) => {
                // Live and connected, just without an editor
                self.surfaces.insert(id, None);
                return Err(e.into());
            }
        };
        let has_surface = surface.is_some();
        self.surfaces.insert(id, surface);

        if !has_surface && self.config.require_ui_surface {
            return Err(HostError::NilUiSurface);
        }

        trace!(instance = %id, has_surface, "UI surface ready");
        Ok(())
    }

    /// Disconnect and drop instances from the tail until `target` remain
    fn prune_to(&mut self, target: usize) {
        while self.instances.len() > target {
            let Some(instance) = self.instances.pop() else {
                break;
            };
            self.with_router_paused(|router| router.disconnect(instance.id));
            self.surfaces.remove(&instance.id);
            debug!(instance = %instance.id, "Instance disconnected");
        }
    }

    /// Run a graph mutation with the engine stopped, restarting it after
    fn with_router_paused<T>(&self, op: impl FnOnce(&dyn AudioRouter) -> T) -> T {
        let router = self.platform.router.as_ref();
        let was_running = router.is_running();
        if was_running {
            router.stop();
        }

        let result = op(router);

        if was_running {
            if let Err(e) = router.start() {
                error!("Failed to restart audio engine after routing change: {}", e);
            }
        }
        result
    }

    /// Snapshot every instance; the first unsupported value fails the whole
    /// capture
    fn handle_capture_all_state(&self) -> Result<StateCollection, HostError> {
        let collection = self
            .instances
            .iter()
            .map(|instance| {
                instance
                    .plugin
                    .full_state()
                    .map(|state| encode_state_map(&state))
                    .transpose()
                    .map_err(|e| {
                        warn!(instance = %instance.id, "State capture failed: {}", e);
                        HostError::from(e)
                    })
            })
            .collect::<Result<StateCollection, HostError>>()?;

        debug!(slots = collection.len(), "State captured");
        Ok(collection)
    }

    /// Apply entries by slot position; `None` entries and slots beyond the
    /// collection keep their state
    fn handle_apply_state_collection(&self, collection: StateCollection) -> usize {
        if collection.len() != self.instances.len() {
            debug!(
                slots = collection.len(),
                live = self.instances.len(),
                "Applying collection of different size"
            );
        }

        let mut applied = 0;
        for (instance, entry) in self.instances.iter().zip(collection.iter()) {
            if let Some(state) = entry {
                instance.plugin.set_full_state(decode_state_map(state));
                applied += 1;
            }
        }

        debug!(applied, "State collection applied");
        applied
    }

    fn fail(&mut self, error: HostError) {
        error!("Instance manager failed: {}", error);
        self.phase = Phase::Failed;
        self.emit(HostEvent::Failed(error));
    }

    fn emit_connected(&self) {
        info!(live = self.instances.len(), phase = ?self.phase, "Instance set settled");
        self.emit(HostEvent::Connected {
            instances: self.instances.clone(),
            surfaces: self.surfaces.clone(),
        });
    }

    fn emit(&self, event: HostEvent) {
        if self.events_tx.send(event).is_err() {
            warn!("Presentation task gone, dropping event");
        }
    }
}
