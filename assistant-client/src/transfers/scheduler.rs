//! Bounded-concurrency transfer scheduler.
//!
//! `submit`, `cancel` and `retry` are synchronous: admission, queueing and
//! promotion of queued tasks happen before they return. Each admitted task runs
//! its own [`Pipeline`]; when it resolves, its slot is released and the queue
//! is pumped again. Tasks only share slot availability.
//!
//! Internally every task is tracked by its local id; the store key may later
//! change to the server-assigned id, and all operations accept either.

use crate::config::TransferSettings;
use crate::models::{TaskId, TransferStatus, TransferTask};
use crate::services::DocumentApi;
use crate::store::StatusStore;
use client_core::retry::RetryConfig;
use client_core::ClientError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::admission::{AdmissionPolicy, FileSubmission};
use super::pipeline::{Outcome, Pipeline};
use super::queue::TransferQueue;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    /// Pause between upload completion and the tag fetch.
    pub settle_delay: Duration,
    pub tag_retry: RetryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&TransferSettings::default())
    }
}

impl From<&TransferSettings> for SchedulerConfig {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent,
            settle_delay: settings.settle_delay(),
            tag_retry: RetryConfig::quick(),
        }
    }
}

#[derive(Clone)]
pub struct TransferScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    api: Arc<dyn DocumentApi>,
    store: StatusStore,
    policy: AdmissionPolicy,
    config: SchedulerConfig,
    core: Mutex<Core>,
    shutdown: CancellationToken,
}

struct Core {
    queue: TransferQueue,
    /// Content kept until the task is Processed so it can be retried.
    submissions: HashMap<TaskId, FileSubmission>,
    running: HashMap<TaskId, CancellationToken>,
    /// local id -> current store id
    current: HashMap<TaskId, TaskId>,
    /// current store id -> local id, for remapped tasks
    aliases: HashMap<TaskId, TaskId>,
    /// Retried while their failed pipeline still held the slot.
    deferred: HashSet<TaskId>,
}

impl Core {
    /// Map either id form to `(local, current)`.
    fn resolve(&self, id: &TaskId) -> (TaskId, TaskId) {
        if let Some(local) = self.aliases.get(id) {
            return (local.clone(), id.clone());
        }
        if let Some(current) = self.current.get(id) {
            return (id.clone(), current.clone());
        }
        (id.clone(), id.clone())
    }

    fn forget(&mut self, local: &TaskId) {
        self.submissions.remove(local);
        self.deferred.remove(local);
        if let Some(current) = self.current.remove(local) {
            self.aliases.remove(&current);
        }
    }
}

impl TransferScheduler {
    pub fn new(
        api: Arc<dyn DocumentApi>,
        store: StatusStore,
        policy: AdmissionPolicy,
        config: SchedulerConfig,
        parent: &CancellationToken,
    ) -> Self {
        let queue = TransferQueue::new(config.max_concurrent);
        Self {
            shared: Arc::new(Shared {
                api,
                store,
                policy,
                config,
                core: Mutex::new(Core {
                    queue,
                    submissions: HashMap::new(),
                    running: HashMap::new(),
                    current: HashMap::new(),
                    aliases: HashMap::new(),
                    deferred: HashSet::new(),
                }),
                shutdown: parent.child_token(),
            }),
        }
    }

    /// Validate and queue a file. Rejections create no task and make no call.
    pub fn submit(&self, file: FileSubmission) -> Result<TaskId, ClientError> {
        if let Err(e) = self.shared.policy.check(&file) {
            metrics::counter!("transfer_rejected_total").increment(1);
            tracing::warn!(filename = %file.filename, error = %e, "Submission rejected");
            return Err(e);
        }

        let id = TaskId::local();
        self.shared.store.insert_task(TransferTask::queued(
            id.clone(),
            file.filename.clone(),
            file.byte_size(),
            file.media_type.clone(),
        ));

        {
            let mut core = self.shared.lock();
            core.submissions.insert(id.clone(), file);
            core.current.insert(id.clone(), id.clone());
            core.queue.enqueue(id.clone());
        }

        metrics::counter!("transfer_submitted_total").increment(1);
        tracing::info!(task_id = %id, "Transfer queued");

        self.shared.pump();
        Ok(id)
    }

    /// Queued: removed outright. Uploading/Processing: best-effort abort.
    /// Terminal: no-op.
    pub fn cancel(&self, id: &TaskId) -> Result<(), ClientError> {
        let mut core = self.shared.lock();
        let (local, current) = core.resolve(id);
        let task = self
            .shared
            .store
            .task(&current)
            .ok_or_else(|| ClientError::TaskNotFound(id.to_string()))?;

        match task.status {
            TransferStatus::Queued => {
                core.queue.remove_pending(&local);
                core.forget(&local);
                self.shared.store.delete_task(&current);
                tracing::info!(task_id = %current, "Queued transfer cancelled");
            }
            TransferStatus::Uploading | TransferStatus::Processing => {
                if let Some(token) = core.running.get(&local) {
                    token.cancel();
                }
                tracing::info!(task_id = %current, status = task.status.as_str(), "Transfer cancel requested");
            }
            TransferStatus::Processed | TransferStatus::Error => {}
        }

        Ok(())
    }

    /// Re-queue a failed task at the tail with progress reset.
    pub fn retry(&self, id: &TaskId) -> Result<(), ClientError> {
        let (local, current) = self.shared.resolve(id);

        if !self.shared.lock().submissions.contains_key(&local) {
            return Err(match self.shared.store.task(&current) {
                Some(task) => ClientError::InvalidTransition(format!(
                    "task {} cannot be retried from {}",
                    current,
                    task.status.as_str()
                )),
                None => ClientError::TaskNotFound(id.to_string()),
            });
        }

        self.shared.store.update_task(&current, |task| task.requeued())?;
        {
            let mut core = self.shared.lock();
            if core.queue.is_active(&local) {
                core.deferred.insert(local);
            } else {
                core.queue.enqueue(local);
            }
        }
        tracing::info!(task_id = %current, "Transfer re-queued");

        self.shared.pump();
        Ok(())
    }

    /// Stop tracking a task, abort its work and delete the server copy if one exists.
    pub async fn delete(&self, id: &TaskId) -> Result<(), ClientError> {
        // Remaps take the same lock
        let (current, removed) = {
            let mut core = self.shared.lock();
            let (local, current) = core.resolve(id);
            core.queue.remove_pending(&local);
            if let Some(token) = core.running.get(&local) {
                token.cancel();
            }
            let removed = self.shared.store.delete_task(&current);
            core.forget(&local);
            (current, removed)
        };

        let task = removed.ok_or_else(|| ClientError::TaskNotFound(id.to_string()))?;
        tracing::info!(task_id = %current, "Transfer deleted");

        if !task.id.is_local() {
            if let Err(e) = self.shared.api.delete_file(task.id.as_str()).await {
                tracing::warn!(task_id = %task.id, error = %e, "Failed to delete server copy");
            }
        }

        Ok(())
    }

    /// Look a task up by its local or server id.
    pub fn task(&self, id: &TaskId) -> Option<TransferTask> {
        let (_, current) = self.shared.resolve(id);
        self.shared.store.task(&current)
    }

    pub fn tasks(&self) -> Vec<TransferTask> {
        self.shared.store.tasks()
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().queue.active_len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().queue.pending_len()
    }

    /// Abort running pipelines and stop admitting queued tasks.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let drained = self.shared.lock().queue.drain();
        tracing::info!(tasks = drained.len(), "Transfer scheduler stopped");
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, id: &TaskId) -> (TaskId, TaskId) {
        self.lock().resolve(id)
    }

    /// Rename the task in the store and record its new id in one critical section.
    fn remap(
        &self,
        local: &TaskId,
        previous: &TaskId,
        canonical: &TaskId,
    ) -> Result<TransferTask, ClientError> {
        let mut core = self.lock();
        let task = self
            .store
            .rename_task(previous, canonical.clone(), |task| {
                task.processing(canonical.clone())
            })?;
        core.aliases.remove(previous);
        core.aliases.insert(canonical.clone(), local.clone());
        core.current.insert(local.clone(), canonical.clone());
        Ok(task)
    }

    /// Promote queued tasks while slots are free.
    fn pump(self: &Arc<Self>) {
        while !self.shutdown.is_cancelled() {
            let admitted = {
                let mut core = self.lock();
                match core.queue.admit_next() {
                    Some(local) => {
                        let token = self.shutdown.child_token();
                        core.running.insert(local.clone(), token.clone());
                        let current = core
                            .current
                            .get(&local)
                            .cloned()
                            .unwrap_or_else(|| local.clone());
                        let submission = core.submissions.get(&local).cloned();
                        Some((local, current, submission, token))
                    }
                    None => None,
                }
            };

            let Some((local, current, submission, token)) = admitted else {
                break;
            };

            let started = submission
                .ok_or_else(|| ClientError::TaskNotFound(local.to_string()))
                .and_then(|submission| {
                    self.store.update_task(&current, |task| task.started())?;
                    Ok(submission)
                });

            match started {
                Ok(submission) => self.spawn(local, current, submission, token),
                Err(e) => {
                    tracing::warn!(task_id = %current, error = %e, "Could not start transfer");
                    let mut core = self.lock();
                    core.queue.release(&local);
                    core.running.remove(&local);
                }
            }
        }
    }

    fn spawn(
        self: &Arc<Self>,
        local: TaskId,
        current: TaskId,
        submission: FileSubmission,
        cancel: CancellationToken,
    ) {
        tracing::info!(task_id = %current, filename = %submission.filename, "Transfer started");

        let remap_target = Arc::downgrade(self);
        let remap_local = local.clone();
        let pipeline = Pipeline {
            task_id: current,
            submission,
            api: self.api.clone(),
            store: self.store.clone(),
            settle_delay: self.config.settle_delay,
            tag_retry: self.config.tag_retry.clone(),
            cancel,
            remap: Arc::new(move |previous, canonical| match remap_target.upgrade() {
                Some(shared) => shared.remap(&remap_local, previous, canonical),
                None => Err(ClientError::Cancelled),
            }),
        };

        let shared = self.clone();
        tokio::spawn(async move {
            let outcome = pipeline.run().await;
            shared.finish(&local, outcome);
        });
    }

    fn finish(self: &Arc<Self>, local: &TaskId, outcome: Outcome) {
        {
            let mut core = self.lock();
            core.queue.release(local);
            core.running.remove(local);
            if core.deferred.remove(local) {
                core.queue.enqueue(local.clone());
            }
            match outcome {
                // Keep the content for an explicit retry
                Outcome::Failed { .. } => {}
                Outcome::Processed { .. } => {
                    core.submissions.remove(local);
                }
                Outcome::Vanished => core.forget(local),
            }
        }

        self.pump();
    }
}
