//! Per-task execution: upload, remap to the server id, settle, enrich.
//!
//! Every stage writes its outcome into the StatusStore through the task's
//! transition functions. A task deleted mid-flight simply stops; nothing is
//! written back for it.

use crate::models::{TaskId, TransferTask};
use crate::services::{DocumentApi, ProgressFn};
use crate::store::StatusStore;
use client_core::retry::{retry_call, RetryConfig};
use client_core::ClientError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::admission::FileSubmission;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Processed { id: TaskId },
    Failed { id: TaskId, message: String },
    /// The task was deleted while running.
    Vanished,
}

/// Moves the task to its server-assigned id and marks it Processing.
pub type RemapFn =
    Arc<dyn Fn(&TaskId, &TaskId) -> Result<TransferTask, ClientError> + Send + Sync>;

pub struct Pipeline {
    pub task_id: TaskId,
    pub submission: FileSubmission,
    pub api: Arc<dyn DocumentApi>,
    pub store: StatusStore,
    pub settle_delay: Duration,
    pub tag_retry: RetryConfig,
    pub cancel: CancellationToken,
    /// Called with `(previous, canonical)` once the server has assigned an id.
    pub remap: RemapFn,
}

impl Pipeline {
    pub async fn run(self) -> Outcome {
        let started = Instant::now();

        let uploaded = tokio::select! {
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.api.upload(&self.submission, self.progress()) => result,
        };

        let file = match uploaded {
            Ok(file) => file,
            Err(e) => return self.fail(e),
        };

        let canonical = TaskId::canonical(file.file_id);
        if let Err(e) = (self.remap)(&self.task_id, &canonical) {
            tracing::debug!(task_id = %self.task_id, error = %e, "Task removed during upload");
            return Outcome::Vanished;
        }

        tracing::info!(
            task_id = %canonical,
            local_id = %self.task_id,
            filename = %self.submission.filename,
            "Upload complete, awaiting enrichment"
        );

        let tags = tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::info!(task_id = %canonical, "Enrichment skipped for cancelled task");
                Vec::new()
            }
            tags = self.enrich(&canonical) => tags,
        };

        match self.store.update_task(&canonical, |task| task.processed(tags)) {
            Ok(task) => {
                metrics::counter!("transfer_processed_total").increment(1);
                metrics::histogram!("transfer_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(task_id = %canonical, tags = task.tags.len(), "Transfer processed");
                Outcome::Processed { id: canonical }
            }
            Err(e) => {
                tracing::debug!(task_id = %canonical, error = %e, "Task removed during enrichment");
                Outcome::Vanished
            }
        }
    }

    fn progress(&self) -> ProgressFn {
        let store = self.store.clone();
        let id = self.task_id.clone();
        Arc::new(move |sent, total| {
            let percent = if total == 0 {
                100
            } else {
                (sent.min(total) * 100 / total) as u8
            };
            // Ignored once the task has moved on or been deleted
            let _ = store.update_task(&id, |task| Ok(task.with_progress(percent)));
        })
    }

    fn fail(&self, error: ClientError) -> Outcome {
        let message = match error {
            ClientError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        };

        match self
            .store
            .update_task(&self.task_id, |task| task.failed(message.clone()))
        {
            Ok(_) => {
                metrics::counter!("transfer_failed_total").increment(1);
                tracing::warn!(task_id = %self.task_id, error = %message, "Transfer failed");
                Outcome::Failed {
                    id: self.task_id.clone(),
                    message,
                }
            }
            Err(_) => Outcome::Vanished,
        }
    }

    /// Best effort: any failure yields no tags.
    async fn enrich(&self, id: &TaskId) -> Vec<String> {
        tokio::time::sleep(self.settle_delay).await;

        match retry_call(&self.tag_retry, "fetch_tags", || self.api.fetch_tags(id.as_str())).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Tag fetch failed, continuing without tags");
                Vec::new()
            }
        }
    }
}
