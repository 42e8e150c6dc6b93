// Event Bus - observer feed for coordination activity
//
// In-memory broadcast of CoordinationEvents to passive observers (transcript
// writers, UIs, debuggers). Lossy: a slow subscriber lags and drops events;
// no coordination state ever depends on an observer seeing one.

use crate::domain::events::CoordinationEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to coordination events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CoordinationEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: CoordinationEvent) {
        debug!("Publishing event: {:?}", event);

        // send() returns the number of receivers; zero subscribers is fine.
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all coordination events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiver for coordination events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available).
    pub async fn recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::AgentId;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(CoordinationEvent::LockAcquired {
            resource_key: "report.md".to_string(),
            holder: AgentId::new("writer"),
            expires_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            CoordinationEvent::LockAcquired { resource_key, holder, .. } => {
                assert_eq!(resource_key, "report.md");
                assert_eq!(holder, AgentId::new("writer"));
            }
            other => panic!("Wrong event type received: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(CoordinationEvent::ContextDeleted {
            namespace: "research".to_string(),
            key: "draft".to_string(),
        });

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }

    #[test]
    fn try_recv_empty() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
