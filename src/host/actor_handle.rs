//! InstanceManagerHandle - Public API for the InstanceActor
//!
//! Fire-and-forget for count changes (the outcome arrives through the
//! observer), async request/response for capture, apply and listing.

use super::actor::InstanceActor;
use super::commands::HostCommand;
use super::types::{HostObserver, HostedInstance, ManagerConfig, Phase};
use crate::error::HostError;
use crate::platform::Platform;
use crate::state::StateCollection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};

/// Handle for interacting with the InstanceActor
///
/// Cheap to clone; every clone feeds the same FIFO queue.
#[derive(Clone)]
pub struct InstanceManagerHandle {
    cmd_tx: mpsc::UnboundedSender<HostCommand>,
    latest_target: Arc<AtomicUsize>,
}

impl InstanceManagerHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<HostCommand>,
        latest_target: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            cmd_tx,
            latest_target,
        }
    }

    /// Spawn a new InstanceActor and return a handle
    ///
    /// This is a convenience wrapper around `InstanceActor::spawn`.
    pub fn spawn(
        config: ManagerConfig,
        platform: Platform,
        observer: Weak<dyn HostObserver>,
    ) -> Self {
        InstanceActor::spawn(config, platform, observer)
    }

    /// Request `target` live instances
    ///
    /// Queued behind any earlier command. Completion is reported through
    /// `on_connected` or `on_failed`; an already satisfied target produces
    /// no notification.
    pub fn set_instance_count(&self, target: usize) {
        self.latest_target.store(target, Ordering::Release);
        let _ = self.cmd_tx.send(HostCommand::SetInstanceCount { target });
    }

    /// Most recently requested instance count
    pub fn requested_instance_count(&self) -> usize {
        self.latest_target.load(Ordering::Acquire)
    }

    /// Snapshot every live instance's state in slot order
    pub async fn capture_all_state(&self) -> Result<StateCollection, HostError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(HostCommand::CaptureAllState {
                response: response_tx,
            })
            .map_err(|_| HostError::ActorGone)?;

        response_rx.await.map_err(|_| HostError::ActorGone)?
    }

    /// Apply a collection by slot position and wait for it to land
    ///
    /// Returns the number of instances that received state.
    pub async fn apply_state_collection(
        &self,
        collection: StateCollection,
    ) -> Result<usize, HostError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(HostCommand::ApplyStateCollection {
                collection,
                response: Some(response_tx),
            })
            .map_err(|_| HostError::ActorGone)?;

        response_rx.await.map_err(|_| HostError::ActorGone)
    }

    /// Live instances in slot order, as of every command queued before this
    pub async fn instances(&self) -> Vec<HostedInstance> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(HostCommand::ListInstances {
                response: response_tx,
            })
            .is_err()
        {
            return Vec::new();
        }

        response_rx.await.unwrap_or_default()
    }

    /// Outcome of the last reconcile, as of every command queued before this
    ///
    /// A stopped actor reports `Failed`.
    pub async fn phase(&self) -> Phase {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(HostCommand::GetPhase {
                response: response_tx,
            })
            .is_err()
        {
            return Phase::Failed;
        }

        response_rx.await.unwrap_or(Phase::Failed)
    }

    /// Check if the actor is still alive
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Disconnect every instance and stop the actor
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(HostCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<InstanceManagerHandle>();
    }

    #[tokio::test]
    async fn test_is_alive_when_channel_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = InstanceManagerHandle::new(tx, Arc::new(AtomicUsize::new(0)));
        assert!(!handle.is_alive());
        assert!(matches!(
            handle.capture_all_state().await,
            Err(HostError::ActorGone)
        ));
        assert!(handle.instances().await.is_empty());
        assert_eq!(handle.phase().await, Phase::Failed);
    }

    #[tokio::test]
    async fn test_set_instance_count_records_latest_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = InstanceManagerHandle::new(tx, Arc::new(AtomicUsize::new(1)));

        handle.set_instance_count(4);
        handle.set_instance_count(2);
        assert_eq!(handle.requested_instance_count(), 2);

        // Both requests are queued, none dropped
        assert!(matches!(
            rx.recv().await,
            Some(HostCommand::SetInstanceCount { target: 4 })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(HostCommand::SetInstanceCount { target: 2 })
        ));
    }
}
