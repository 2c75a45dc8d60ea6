//! Transfer task model.
//!
//! All state changes are pure functions returning the next value, so they can
//! be used directly as StatusStore updaters.

use chrono::{DateTime, Utc};
use client_core::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Task identifier: local until the server assigns its canonical file id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    const LOCAL_PREFIX: &'static str = "local-";

    pub fn local() -> Self {
        Self(format!("{}{}", Self::LOCAL_PREFIX, Uuid::new_v4()))
    }

    pub fn canonical(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Queued,
    Uploading,
    Processing,
    Processed,
    Error,
}

impl TransferStatus {
    /// Queued -> Uploading -> Processing -> {Processed | Error}, plus the
    /// upload failure edge and the explicit retry edge Error -> Queued.
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Queued, Uploading)
                | (Uploading, Processing)
                | (Uploading, Error)
                | (Processing, Processed)
                | (Processing, Error)
                | (Error, Queued)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Processed | TransferStatus::Error)
    }

    /// Occupies a concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(self, TransferStatus::Uploading | TransferStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Uploading => "uploading",
            TransferStatus::Processing => "processing",
            TransferStatus::Processed => "processed",
            TransferStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTask {
    /// Current id; equals `local_id` until the server assigns one.
    pub id: TaskId,
    pub local_id: TaskId,
    pub filename: String,
    pub byte_size: u64,
    pub media_type: String,
    pub status: TransferStatus,
    /// 0-100, meaningful only while Uploading.
    pub progress_percent: u8,
    pub error_message: Option<String>,
    /// Populated once Processed.
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferTask {
    pub fn queued(
        local_id: TaskId,
        filename: impl Into<String>,
        byte_size: u64,
        media_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: local_id.clone(),
            local_id,
            filename: filename.into(),
            byte_size,
            media_type: media_type.into(),
            status: TransferStatus::Queued,
            progress_percent: 0,
            error_message: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A file that already exists server-side and was never uploaded by this client.
    pub fn remote(
        id: TaskId,
        filename: impl Into<String>,
        byte_size: u64,
        media_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.clone(),
            local_id: id,
            filename: filename.into(),
            byte_size,
            media_type: media_type.into(),
            status: TransferStatus::Processed,
            progress_percent: 100,
            error_message: None,
            tags: Vec::new(),
            created_at,
            updated_at: Utc::now(),
        }
    }

    fn transition(&self, next: TransferStatus) -> Result<Self, ClientError> {
        if !self.status.can_transition_to(next) {
            return Err(ClientError::InvalidTransition(format!(
                "task {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }

        let mut task = self.clone();
        task.status = next;
        task.updated_at = Utc::now();
        Ok(task)
    }

    pub fn started(&self) -> Result<Self, ClientError> {
        let mut task = self.transition(TransferStatus::Uploading)?;
        task.progress_percent = 0;
        Ok(task)
    }

    /// Progress never moves backwards and is ignored outside Uploading.
    pub fn with_progress(&self, percent: u8) -> Self {
        let mut task = self.clone();
        if task.status == TransferStatus::Uploading {
            let next = percent.min(100).max(task.progress_percent);
            if next != task.progress_percent {
                task.progress_percent = next;
                task.updated_at = Utc::now();
            }
        }
        task
    }

    /// Bytes delivered; the server now knows the file as `canonical_id`.
    pub fn processing(&self, canonical_id: TaskId) -> Result<Self, ClientError> {
        let mut task = self.transition(TransferStatus::Processing)?;
        task.id = canonical_id;
        task.progress_percent = 100;
        Ok(task)
    }

    pub fn processed(&self, tags: Vec<String>) -> Result<Self, ClientError> {
        let mut task = self.transition(TransferStatus::Processed)?;
        task.tags = tags;
        Ok(task)
    }

    pub fn failed(&self, message: impl Into<String>) -> Result<Self, ClientError> {
        let mut task = self.transition(TransferStatus::Error)?;
        task.error_message = Some(message.into());
        Ok(task)
    }

    /// Explicit retry: back to the queue with progress and error cleared.
    pub fn requeued(&self) -> Result<Self, ClientError> {
        let mut task = self.transition(TransferStatus::Queued)?;
        task.progress_percent = 0;
        task.error_message = None;
        task.tags.clear();
        Ok(task)
    }
}
