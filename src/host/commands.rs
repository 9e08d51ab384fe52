//! Commands for the instance actor
//!
//! Every command goes through one FIFO queue, so growth, pruning, capture
//! and apply never interleave.

use super::types::{HostedInstance, Phase};
use crate::error::HostError;
use crate::state::StateCollection;
use tokio::sync::oneshot;

pub enum HostCommand {
    /// Reconcile the live list to `target` instances
    SetInstanceCount { target: usize },

    /// Snapshot every live instance's state in slot order
    CaptureAllState {
        response: oneshot::Sender<Result<StateCollection, HostError>>,
    },

    /// Apply a collection positionally; responds with the number of slots
    /// that received state
    ApplyStateCollection {
        collection: StateCollection,
        response: Option<oneshot::Sender<usize>>,
    },

    /// Live instances in slot order
    ListInstances {
        response: oneshot::Sender<Vec<HostedInstance>>,
    },

    /// Outcome of the last reconcile
    GetPhase { response: oneshot::Sender<Phase> },

    /// Disconnect every instance and stop the actor
    Shutdown,
}

// Manual Debug implementation because oneshot payloads aren't interesting
impl std::fmt::Debug for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostCommand::SetInstanceCount { target } => f
                .debug_struct("SetInstanceCount")
                .field("target", target)
                .finish(),
            HostCommand::CaptureAllState { .. } => {
                f.debug_struct("CaptureAllState").finish_non_exhaustive()
            }
            HostCommand::ApplyStateCollection { collection, .. } => f
                .debug_struct("ApplyStateCollection")
                .field("slots", &collection.len())
                .finish_non_exhaustive(),
            HostCommand::ListInstances { .. } => {
                f.debug_struct("ListInstances").finish_non_exhaustive()
            }
            HostCommand::GetPhase { .. } => f.debug_struct("GetPhase").finish_non_exhaustive(),
            HostCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}
