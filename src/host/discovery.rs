//! Component discovery with one bounded retry
//!
//! A freshly installed plugin registers itself with the platform the first
//! time its container app runs, which can race the host's own startup. If
//! the registry has no match, wait for one "registrations changed"
//! notification (bounded by a timeout) and look again exactly once.

use crate::error::HostError;
use crate::platform::{ComponentDescription, ComponentRegistry};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub async fn discover(
    registry: &dyn ComponentRegistry,
    description: &ComponentDescription,
    timeout: Duration,
) -> Result<ComponentDescription, HostError> {
    // Subscribe before the first query so a registration landing in between
    // still wakes us up
    let mut changes = registry.subscribe_changes();

    if let Some(found) = registry.find_components(description).into_iter().next() {
        debug!("Component found: {}", found);
        return Ok(found);
    }

    info!(
        timeout_ms = timeout.as_millis() as u64,
        "Component {} not registered yet, waiting for registry change", description
    );

    match tokio::time::timeout(timeout, changes.recv()).await {
        Ok(Ok(())) | Ok(Err(RecvError::Lagged(_))) => {
            drop(changes);
            debug!("Registry changed, retrying discovery");
            registry
                .find_components(description)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    warn!("Component {} still missing after registry change", description);
                    HostError::ComponentNotFound(description.to_string())
                })
        }
        Ok(Err(RecvError::Closed)) => {
            warn!("Registry change stream closed while waiting for {}", description);
            Err(HostError::ComponentNotFound(description.to_string()))
        }
        Err(_) => {
            warn!("Timed out waiting for component {}", description);
            Err(HostError::ComponentNotFound(description.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimRegistry;
    use crate::platform::FourCharCode;

    fn desc() -> ComponentDescription {
        ComponentDescription {
            component_type: FourCharCode::new(b"aumu"),
            subtype: FourCharCode::new(b"demo"),
            manufacturer: FourCharCode::new(b"Acme"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_immediately() {
        let registry = SimRegistry::with_component(desc());
        let found = discover(registry.as_ref(), &desc(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, desc());
        assert_eq!(registry.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_registration() {
        let registry = SimRegistry::new();
        registry.register_after(desc(), Duration::from_secs(2));

        let found = discover(registry.as_ref(), &desc(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(found, desc());
        assert_eq!(registry.query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_not_found() {
        let registry = SimRegistry::new();
        let start = tokio::time::Instant::now();

        let err = discover(registry.as_ref(), &desc(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::ComponentNotFound(_)));
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(registry.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_change_retries_only_once() {
        let registry = SimRegistry::new();
        let notifier = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            notifier.notify_unrelated_change();
            tokio::time::sleep(Duration::from_secs(1)).await;
            notifier.notify_unrelated_change();
        });

        let err = discover(registry.as_ref(), &desc(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::ComponentNotFound(_)));
        assert_eq!(registry.query_count(), 2);
    }
}
