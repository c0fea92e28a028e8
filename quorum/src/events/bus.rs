//! Broadcast event bus for task lifecycle events

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::QuorumEvent;
use crate::state::TaskId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Fire-and-forget pub/sub. Publishing never fails; slow subscribers lag.
pub struct EventBus {
    sender: broadcast::Sender<QuorumEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: QuorumEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuorumEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by task ID
    pub task_id: Option<TaskId>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task_id: &TaskId) -> Self {
        self.task_id = Some(task_id.clone());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &QuorumEvent) -> bool {
        if let Some(ref tid) = self.task_id {
            if event.task_id() != tid {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<QuorumEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<QuorumEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<QuorumEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn created(task_id: &TaskId) -> QuorumEvent {
        QuorumEvent::TaskCreated {
            task_id: task_id.clone(),
            k: 3,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(created(&TaskId::new(1)));

        assert_eq!(rx1.recv().await.unwrap().event_type(), "task_created");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "task_created");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(created(&TaskId::new(1)));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_filter() {
        let target = TaskId::new(1);
        let filter = EventFilter::new()
            .task(&target)
            .types(vec!["task_created", "task_settled"]);

        let other_task = created(&TaskId::new(2));
        let other_type = QuorumEvent::DeadlineReached {
            task_id: target.clone(),
            completed: 1,
            k: 3,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&created(&target)));
        assert!(!filter.matches(&other_task));
        assert!(!filter.matches(&other_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let target = TaskId::new(2);
        let mut filtered = bus.subscribe_filtered(EventFilter::new().task(&target));

        let publisher = Arc::clone(&bus);
        let wanted = target.clone();
        tokio::spawn(async move {
            publisher.publish(created(&TaskId::new(1)));
            publisher.publish(created(&wanted));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.task_id(), &target);
    }
}
