//! EventBus (§2 item 9, §6): fan-out of execution events to observers.
//! Lifecycle events are buffered in a bounded queue (default 100,
//! drop-oldest on overflow with a counted warning); log events may be
//! dropped under backpressure without a warning.

use dipeo_tokens::{ExecutionId, NodeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Event {
    ExecutionStarted { execution_id: ExecutionId },
    NodeStarted { execution_id: ExecutionId, node: NodeId },
    NodeCompleted { execution_id: ExecutionId, node: NodeId },
    NodeFailed { execution_id: ExecutionId, node: NodeId, tag: String, message: String },
    ExecutionCompleted { execution_id: ExecutionId, status: &'static str },
    ExecutionCancelled { execution_id: ExecutionId },
    Log { execution_id: ExecutionId, message: String },
}

pub type SubscriptionId = u64;

/// One `tokio::sync::broadcast` channel per execution id. Lifecycle
/// events use a bounded capacity per §6; when a receiver lags behind,
/// `broadcast` drops its oldest unread messages for that receiver only
/// (the standard library's closest match to "drop-oldest on overflow").
pub struct EventBus {
    buffer_size: usize,
    channels: RwLock<HashMap<ExecutionId, broadcast::Sender<Event>>>,
    dropped_log_events: AtomicU64,
    next_sub_id: AtomicU64,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            channels: RwLock::new(HashMap::new()),
            dropped_log_events: AtomicU64::new(0),
            next_sub_id: AtomicU64::new(1),
        }
    }

    fn channel_for(&self, execution_id: &ExecutionId) -> broadcast::Sender<Event> {
        if let Some(tx) = self.channels.read().unwrap().get(execution_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(execution_id.clone())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }

    pub fn publish(&self, execution_id: &ExecutionId, event: Event) {
        let tx = self.channel_for(execution_id);
        if matches!(event, Event::Log { .. }) && tx.receiver_count() == 0 {
            self.dropped_log_events.fetch_add(1, Ordering::Relaxed);
            return;
        }
        // `send` only errors when there are no receivers; that is not a
        // failure for a fire-and-forget bus.
        let _ = tx.send(event);
    }

    pub fn subscribe(&self, execution_id: &ExecutionId) -> (SubscriptionId, broadcast::Receiver<Event>) {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        (id, self.channel_for(execution_id).subscribe())
    }

    pub fn dropped_log_events(&self) -> u64 {
        self.dropped_log_events.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new(16);
        let exec = ExecutionId::from("e1");
        let (_id, mut rx) = bus.subscribe(&exec);
        bus.publish(&exec, Event::ExecutionStarted { execution_id: exec.clone() });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::ExecutionStarted { .. }));
    }

    #[tokio::test]
    async fn log_events_with_no_subscribers_are_dropped_and_counted() {
        let bus = EventBus::new(16);
        let exec = ExecutionId::from("e1");
        bus.publish(&exec, Event::Log { execution_id: exec.clone(), message: "hi".into() });
        assert_eq!(bus.dropped_log_events(), 1);
    }
}
