//! Presentation task: delivers host events to the observer
//!
//! Events arrive in the order the control task produced them and are handed
//! to the observer one at a time, so a later notification always lands
//! after an earlier one. The observer is held weakly; once it is dropped,
//! events are discarded.

use super::types::{HostEvent, HostObserver};
use std::sync::Weak;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Spawn the presentation task and return the sender the control task
/// publishes on
pub fn spawn(observer: Weak<dyn HostObserver>) -> mpsc::UnboundedSender<HostEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(rx, observer));
    tx
}

async fn run(mut rx: mpsc::UnboundedReceiver<HostEvent>, observer: Weak<dyn HostObserver>) {
    debug!("Presentation task started");

    while let Some(event) = rx.recv().await {
        let Some(observer) = observer.upgrade() else {
            trace!(?event, "Observer gone, dropping event");
            continue;
        };

        match &event {
            HostEvent::Connected {
                instances,
                surfaces,
            } => observer.on_connected(instances, surfaces),
            HostEvent::Failed(error) => observer.on_failed(error),
            HostEvent::StateCaptured(collection) => observer.on_state_captured(collection),
        }
    }

    debug!("Presentation task terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::types::ChannelObserver;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        let weak: Weak<dyn HostObserver> = Arc::downgrade(&observer) as Weak<dyn HostObserver>;
        let tx = spawn(weak);

        tx.send(HostEvent::Failed(HostError::NilInstance)).unwrap();
        tx.send(HostEvent::StateCaptured(vec![None])).unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(HostEvent::Failed(HostError::NilInstance))
        ));
        assert!(matches!(rx.recv().await, Some(HostEvent::StateCaptured(c)) if c.len() == 1));
    }

    #[tokio::test]
    async fn test_dropped_observer_is_not_kept_alive() {
        let (observer, mut rx) = ChannelObserver::new();
        let weak: Weak<dyn HostObserver> = Arc::downgrade(&observer) as Weak<dyn HostObserver>;
        let tx = spawn(weak);
        drop(observer);

        tx.send(HostEvent::Failed(HostError::NilInstance)).unwrap();
        drop(tx);

        // Channel closes once the dropped observer's sender is gone
        assert!(rx.recv().await.is_none());
    }
}
