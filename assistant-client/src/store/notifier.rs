//! Publish/subscribe fan-out of StatusStore changes.

use crate::models::{Entity, EntityId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum StoreEvent {
    Upserted { id: EntityId, value: Entity },
    Deleted { id: EntityId },
    /// A key was replaced, e.g. a task remapped from its local to its canonical id.
    Renamed { from: EntityId, to: EntityId },
}

impl StoreEvent {
    pub fn id(&self) -> &EntityId {
        match self {
            StoreEvent::Upserted { id, .. } | StoreEvent::Deleted { id } => id,
            StoreEvent::Renamed { to, .. } => to,
        }
    }
}

/// Consumer of store changes. Implemented for any `Fn(&StoreEvent)`.
pub trait StoreListener: Send + Sync + 'static {
    fn on_event(&self, event: &StoreEvent);
}

impl<F> StoreListener for F
where
    F: Fn(&StoreEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<StoreEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: StoreEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Forward every event to `listener` until `shutdown` is cancelled.
    ///
    /// A listener that falls behind skips the missed events and keeps going.
    pub fn attach<L: StoreListener>(&self, listener: L, shutdown: &CancellationToken) -> JoinHandle<()> {
        let mut receiver = self.sender.subscribe();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => listener.on_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Store listener lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("Store listener detached");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RealtimeMessage, TaskId};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_subscribers_receive_in_publish_order() {
        let notifier = Notifier::default();
        let mut receiver = notifier.subscribe();

        notifier.publish(StoreEvent::Upserted {
            id: EntityId::Message(0),
            value: Entity::Message(RealtimeMessage::user("one", None)),
        });
        notifier.publish(StoreEvent::Deleted {
            id: EntityId::Message(0),
        });

        assert!(matches!(
            receiver.recv().await.unwrap(),
            StoreEvent::Upserted { .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            StoreEvent::Deleted { .. }
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let notifier = Notifier::new(4);
        notifier.publish(StoreEvent::Deleted {
            id: EntityId::Session,
        });
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_attached_listener_stops_on_shutdown() {
        let notifier = Notifier::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let sink = seen.clone();
        let handle = notifier.attach(
            move |event: &StoreEvent| sink.lock().unwrap().push(event.id().clone()),
            &shutdown,
        );

        let task_id = EntityId::Task(TaskId::canonical("f-1"));
        notifier.publish(StoreEvent::Renamed {
            from: EntityId::Task(TaskId::canonical("local-1")),
            to: task_id.clone(),
        });

        // Let the listener drain before shutting it down
        for _ in 0..10 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[task_id]);
    }
}
