use serde::Serialize;
use tokio::sync::broadcast;

/// Property paths published when configuration changes.
pub mod properties {
    pub const MANAGED_REPOSITORIES: &str = "repositories.managed";
    pub const REMOTE_REPOSITORIES: &str = "repositories.remote";
    pub const PROXY_CONNECTORS: &str = "proxyConnectors";
    pub const CONFIGURATION: &str = "configuration";
}

/// A configuration property changed.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationEvent {
    /// Property path, e.g. "proxyConnectors"
    pub property: String,
    /// Identifier of the affected entry, e.g. "internal->central"
    pub value: String,
    /// Configuration generation after the change
    pub generation: u64,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ConfigurationEvent {
    /// Create an event timestamped to now.
    pub fn now(property: impl Into<String>, value: impl Into<String>, generation: u64) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            generation,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Broadcast-based event bus for configuration changes.
///
/// Subscribers receive events via `tokio::sync::broadcast`. If a subscriber
/// falls behind, it receives `RecvError::Lagged` and should re-read the
/// current configuration snapshot.
pub struct EventBus {
    tx: broadcast::Sender<ConfigurationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. If there are no subscribers the event is dropped silently.
    pub fn publish(&self, event: ConfigurationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigurationEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ConfigurationEvent::now(properties::PROXY_CONNECTORS, "internal->central", 2));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.property, "proxyConnectors");
        assert_eq!(event.value, "internal->central");
        assert_eq!(event.generation, 2);
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(ConfigurationEvent::now(properties::CONFIGURATION, "", 1));
    }

    #[tokio::test]
    async fn lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.publish(ConfigurationEvent::now(properties::MANAGED_REPOSITORIES, i.to_string(), i));
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            other => panic!("Expected Lagged, got {:?}", other),
        }
    }

    #[test]
    fn event_serializes() {
        let event = ConfigurationEvent {
            property: "repositories.remote".into(),
            value: "central".into(),
            generation: 3,
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""property":"repositories.remote""#));
    }
}
