//! [crates/fleet-core/src/relay.rs]
//! Event Relay: domain events are formatted into `EventEnvelope`s,
//! published to an external pub/sub bus for cross-process fan-out, then
//! delivered to locally registered subscribers with per-subscriber filtering
//! and bounded, lossy queues: a broadcast pattern over an external pub/sub
//! bus, plus a filtering subscriber registry on top for local fan-out.

use async_trait::async_trait;
use fleet_domain::{DomainEvent, EventEnvelope, WorkerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Depth of each subscriber's local delivery queue.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;
/// How long a non-blocking enqueue attempt waits before the message is dropped.
const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn publish(&self, channel: &str, envelope: &EventEnvelope) -> anyhow::Result<()>;
    /// Subscribes to the channel, returning a receiver of already-deserialized envelopes.
    async fn subscribe(&self, channel: &str) -> anyhow::Result<mpsc::Receiver<EventEnvelope>>;
}

/// In-process stand-in used for single-instance deployments and tests; simply
/// loops envelopes back to a broadcast channel rather than talking to an
/// external bus.
pub struct InMemoryPubSub {
    sender: tokio::sync::broadcast::Sender<EventEnvelope>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(4096);
        Self { sender }
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubBus for InMemoryPubSub {
    async fn publish(&self, _channel: &str, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self, _channel: &str) -> anyhow::Result<mpsc::Receiver<EventEnvelope>> {
        let mut broadcast_rx = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Ok(envelope) = broadcast_rx.recv().await {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub worker_ids: Option<Vec<WorkerId>>,
    pub event_types: Option<Vec<String>>,
}

impl SubscriptionFilter {
    fn accepts(&self, envelope: &EventEnvelope) -> bool {
        let worker_ok = match &self.worker_ids {
            None => true,
            Some(ids) => envelope
                .data
                .get("worker_id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<WorkerId>().ok())
                .map(|wid| ids.contains(&wid))
                .unwrap_or(false),
        };
        let type_ok = match &self.event_types {
            None => true,
            Some(types) => types.iter().any(|t| t == &envelope.event_type),
        };
        worker_ok && type_ok
    }
}

struct Subscriber {
    filter: SubscriptionFilter,
    sender: mpsc::Sender<EventEnvelope>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holds local subscribers and delivers filtered, best-effort broadcasts.
#[derive(Default)]
struct SubscriberRegistry {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    fn register(&self, filter: SubscriptionFilter) -> (SubscriptionId, mpsc::Receiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .expect("subscriber registry mutex poisoned")
            .insert(id, Subscriber { filter, sender });
        (SubscriptionId(id), receiver)
    }

    fn unregister(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .expect("subscriber registry mutex poisoned")
            .remove(&id.0);
    }

    async fn dispatch(&self, envelope: EventEnvelope) {
        let targets: Vec<mpsc::Sender<EventEnvelope>> = {
            let guard = self.subscribers.lock().expect("subscriber registry mutex poisoned");
            guard
                .values()
                .filter(|s| s.filter.accepts(&envelope))
                .map(|s| s.sender.clone())
                .collect()
        };
        for sender in targets {
            let envelope = envelope.clone();
            match tokio::time::timeout(ENQUEUE_TIMEOUT, sender.send(envelope)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    warn!(event_type = %"dropped", "subscriber queue full or closed, dropping event");
                }
            }
        }
    }
}

/// Fan-out service: domain events in, filtered subscriber pushes out, with an
/// external pub/sub bus in the loop so peer processes converge on the same
/// event stream. Falls back to local-only broadcast if the bus is unavailable.
pub struct EventRelay {
    bus: Box<dyn PubSubBus>,
    channel: String,
    registry: SubscriberRegistry,
}

impl EventRelay {
    pub fn new(bus: Box<dyn PubSubBus>, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
            registry: SubscriberRegistry::default(),
        }
    }

    /// Starts the listener loop that reads the bus and dispatches to local
    /// subscribers. Call once at startup; runs for the lifetime of the process.
    pub async fn spawn_listener(self: std::sync::Arc<Self>) -> anyhow::Result<()> {
        let mut receiver = self.bus.subscribe(&self.channel).await?;
        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                self.registry.dispatch(envelope).await;
            }
        });
        Ok(())
    }

    #[instrument(skip(self, event))]
    pub async fn publish_domain_event(&self, event: &DomainEvent) {
        let envelope = EventEnvelope::from_domain_event(event);
        self.publish_envelope(envelope).await;
    }

    async fn publish_envelope(&self, envelope: EventEnvelope) {
        match self.bus.publish(&self.channel, &envelope).await {
            Ok(()) => debug!(event_type = %envelope.event_type, "published to bus"),
            Err(err) => {
                warn!(error = %err, "pub/sub bus unavailable, falling back to local-only broadcast");
                self.registry.dispatch(envelope).await;
            }
        }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> (SubscriptionId, mpsc::Receiver<EventEnvelope>) {
        self.registry.register(filter)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unregister(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::WorkerStatus;

    fn status_event(worker_id: WorkerId) -> DomainEvent {
        DomainEvent::StatusUpdated {
            worker_id,
            old_status: WorkerStatus::Pending,
            new_status: WorkerStatus::Running,
            at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_without_filter_receives_all_events() {
        let relay = std::sync::Arc::new(EventRelay::new(Box::new(InMemoryPubSub::new()), "fleet"));
        relay.clone().spawn_listener().await.unwrap();
        let (_id, mut rx) = relay.subscribe(SubscriptionFilter::default());

        relay.publish_domain_event(&status_event(WorkerId::new())).await;

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(received.unwrap().is_some());
    }

    #[tokio::test]
    async fn subscriber_filters_by_worker_id() {
        let relay = std::sync::Arc::new(EventRelay::new(Box::new(InMemoryPubSub::new()), "fleet"));
        relay.clone().spawn_listener().await.unwrap();
        let target = WorkerId::new();
        let other = WorkerId::new();
        let (_id, mut rx) = relay.subscribe(SubscriptionFilter {
            worker_ids: Some(vec![target]),
            event_types: None,
        });

        relay.publish_domain_event(&status_event(other)).await;
        relay.publish_domain_event(&status_event(target)).await;

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            received.data.get("worker_id").and_then(|v| v.as_str()),
            Some(target.to_string().as_str())
        );
    }
}
