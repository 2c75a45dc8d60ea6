//! Shared, observable entity state.
//!
//! Every write is a function of the previous value for that id and is applied
//! under the entry's shard lock, so racing updates to the same id compose.
//! Change events for an id are published while that lock is held, which keeps
//! per-id event order identical to write order.
//!
//! Updaters run under the lock: they must be pure and must not call back into
//! the store.

use crate::models::{Entity, EntityId, RealtimeMessage, SessionSnapshot, TaskId, TransferTask};
use client_core::ClientError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::notifier::{Notifier, StoreEvent};

#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<EntityId, Entity>,
    next_message: AtomicU64,
    notifier: Notifier,
}

impl StatusStore {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_message: AtomicU64::new(0),
                notifier,
            }),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.notifier.subscribe()
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        self.inner.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Insert or replace the value for `id`, computed from the previous value.
    pub fn upsert<F>(&self, id: EntityId, updater: F) -> Entity
    where
        F: FnOnce(Option<&Entity>) -> Entity,
    {
        match self.inner.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let next = updater(Some(occupied.get()));
                occupied.insert(next.clone());
                self.publish_upsert(id, &next);
                next
            }
            Entry::Vacant(vacant) => {
                let next = updater(None);
                vacant.insert(next.clone());
                self.publish_upsert(id, &next);
                next
            }
        }
    }

    /// Update an existing entry. Returns `None` (and writes nothing) when the
    /// id is absent, so a deleted entity is never resurrected by a late update.
    pub fn update<F>(&self, id: &EntityId, updater: F) -> Option<Entity>
    where
        F: FnOnce(&Entity) -> Entity,
    {
        let mut entry = self.inner.entries.get_mut(id)?;
        let next = updater(entry.value());
        *entry = next.clone();
        self.publish_upsert(id.clone(), &next);
        Some(next)
    }

    pub fn delete(&self, id: &EntityId) -> Option<Entity> {
        let (id, previous) = self.inner.entries.remove(id)?;
        self.inner.notifier.publish(StoreEvent::Deleted { id });
        Some(previous)
    }

    fn publish_upsert(&self, id: EntityId, value: &Entity) {
        self.inner.notifier.publish(StoreEvent::Upserted {
            id,
            value: value.clone(),
        });
    }

    // Messages

    /// Append a message and return its sequence number.
    pub fn append_message(&self, message: RealtimeMessage) -> u64 {
        let seq = self.inner.next_message.fetch_add(1, Ordering::SeqCst);
        self.upsert(EntityId::Message(seq), |_| Entity::Message(message));
        seq
    }

    pub fn message(&self, seq: u64) -> Option<RealtimeMessage> {
        self.get(&EntityId::Message(seq))
            .and_then(|entity| entity.as_message().cloned())
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> Vec<(u64, RealtimeMessage)> {
        let mut messages: Vec<(u64, RealtimeMessage)> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| match (entry.key(), entry.value()) {
                (EntityId::Message(seq), Entity::Message(message)) => {
                    Some((*seq, message.clone()))
                }
                _ => None,
            })
            .collect();
        messages.sort_by_key(|(seq, _)| *seq);
        messages
    }

    /// Remove every message. Sequence numbers are not reused.
    pub fn clear_messages(&self) -> usize {
        let ids: Vec<EntityId> = self
            .inner
            .entries
            .iter()
            .filter(|entry| matches!(entry.key(), EntityId::Message(_)))
            .map(|entry| entry.key().clone())
            .collect();

        ids.iter().filter(|id| self.delete(id).is_some()).count()
    }

    // Tasks

    pub fn task(&self, id: &TaskId) -> Option<TransferTask> {
        self.get(&EntityId::Task(id.clone()))
            .and_then(|entity| entity.as_task().cloned())
    }

    pub fn insert_task(&self, task: TransferTask) -> TransferTask {
        let id = EntityId::Task(task.id.clone());
        self.upsert(id, |_| Entity::Task(task.clone()));
        task
    }

    /// Apply a fallible transition to an existing task.
    ///
    /// Nothing is written when the task is missing or the transition fails.
    pub fn update_task<F>(&self, id: &TaskId, transition: F) -> Result<TransferTask, ClientError>
    where
        F: FnOnce(&TransferTask) -> Result<TransferTask, ClientError>,
    {
        let key = EntityId::Task(id.clone());
        let mut entry = self
            .inner
            .entries
            .get_mut(&key)
            .ok_or_else(|| ClientError::TaskNotFound(id.to_string()))?;

        let next = match entry.value() {
            Entity::Task(task) => transition(task)?,
            _ => return Err(ClientError::TaskNotFound(id.to_string())),
        };

        *entry = Entity::Task(next.clone());
        self.publish_upsert(key, &Entity::Task(next.clone()));
        Ok(next)
    }

    /// Move a task to a new key, applying `transition` on the way.
    ///
    /// Publishes `Renamed` followed by `Upserted` under the new key.
    pub fn rename_task<F>(
        &self,
        from: &TaskId,
        to: TaskId,
        transition: F,
    ) -> Result<TransferTask, ClientError>
    where
        F: FnOnce(&TransferTask) -> Result<TransferTask, ClientError>,
    {
        if *from == to {
            return self.update_task(from, transition);
        }

        let from_key = EntityId::Task(from.clone());
        let to_key = EntityId::Task(to);

        let next = {
            let entry = self
                .inner
                .entries
                .get(&from_key)
                .ok_or_else(|| ClientError::TaskNotFound(from.to_string()))?;
            match entry.value() {
                Entity::Task(task) => transition(task)?,
                _ => return Err(ClientError::TaskNotFound(from.to_string())),
            }
        };

        // Deleted while the transition was computed
        if self.inner.entries.remove(&from_key).is_none() {
            return Err(ClientError::TaskNotFound(from.to_string()));
        }

        let slot = self
            .inner
            .entries
            .entry(to_key.clone())
            .insert(Entity::Task(next.clone()));
        self.inner.notifier.publish(StoreEvent::Renamed {
            from: from_key,
            to: to_key.clone(),
        });
        self.publish_upsert(to_key, &Entity::Task(next.clone()));
        drop(slot);

        Ok(next)
    }

    pub fn delete_task(&self, id: &TaskId) -> Option<TransferTask> {
        self.delete(&EntityId::Task(id.clone()))
            .and_then(|entity| entity.as_task().cloned())
    }

    /// Tasks ordered by creation time.
    pub fn tasks(&self) -> Vec<TransferTask> {
        let mut tasks: Vec<TransferTask> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| entry.value().as_task().cloned())
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    // Session

    pub fn session(&self) -> SessionSnapshot {
        self.get(&EntityId::Session)
            .and_then(|entity| entity.as_session().cloned())
            .unwrap_or_default()
    }

    pub fn set_session(&self, snapshot: SessionSnapshot) {
        self.upsert(EntityId::Session, |_| Entity::Session(snapshot));
    }
}
