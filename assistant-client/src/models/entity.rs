use super::{RealtimeMessage, SessionSnapshot, TaskId, TransferTask};
use serde::Serialize;
use std::fmt;

/// Key of a StatusStore entry.
///
/// Messages, tasks and the session live in disjoint id spaces, so the
/// session actor and the transfer scheduler never write the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityId {
    Session,
    Message(u64),
    Task(TaskId),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Session => write!(f, "session"),
            EntityId::Message(seq) => write!(f, "message:{}", seq),
            EntityId::Task(id) => write!(f, "task:{}", id),
        }
    }
}

/// Current value of a StatusStore entry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Entity {
    Session(SessionSnapshot),
    Message(RealtimeMessage),
    Task(TransferTask),
}

impl Entity {
    pub fn as_session(&self) -> Option<&SessionSnapshot> {
        match self {
            Entity::Session(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&RealtimeMessage> {
        match self {
            Entity::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&TransferTask> {
        match self {
            Entity::Task(task) => Some(task),
            _ => None,
        }
    }
}
