use crate::auth::{Credential, LogoutCallback, TokenGuard};
use crate::config::Settings;
use crate::dtos::{ExportResponse, FileStatusResponse, StatusMessageResponse};
use crate::models::{CloseReason, MessageAction, RealtimeMessage, TaskId, TransferTask};
use crate::services::{ChatApi, DocumentApi, HttpChatClient, HttpDocumentClient};
use crate::session::{Connector, SessionConfig, SessionManager, WebSocketConnector};
use crate::store::{Notifier, StatusStore};
use crate::transfers::{AdmissionPolicy, FileSubmission, SchedulerConfig, TransferScheduler};
use client_core::retry::{retry_call, RetryConfig};
use client_core::ClientError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Model used when neither the message nor the settings name one.
pub const DEFAULT_MODEL: &str = "qwen2";

/// REST and realtime collaborators, injectable for tests.
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub documents: Arc<dyn DocumentApi>,
    pub chat: Arc<dyn ChatApi>,
}

impl Collaborators {
    pub fn from_settings(settings: &Settings, credential: &Credential) -> Self {
        Self {
            connector: Arc::new(WebSocketConnector::new(settings.realtime.url.clone())),
            documents: Arc::new(HttpDocumentClient::new(
                &settings.api,
                credential.clone(),
                settings.transfers.upload_chunk_bytes,
            )),
            chat: Arc::new(HttpChatClient::new(&settings.api, credential.clone())),
        }
    }
}

pub struct Application {
    settings: Settings,
    credential: Credential,
    store: StatusStore,
    session: SessionManager,
    token_guard: TokenGuard,
    scheduler: TransferScheduler,
    documents: Arc<dyn DocumentApi>,
    chat: Arc<dyn ChatApi>,
    logged_out: watch::Receiver<Option<CloseReason>>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn build(settings: Settings, credential: Credential) -> Self {
        let collaborators = Collaborators::from_settings(&settings, &credential);
        Self::build_with(settings, credential, collaborators)
    }

    pub fn build_with(
        settings: Settings,
        credential: Credential,
        collaborators: Collaborators,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let store = StatusStore::new(Notifier::default());

        let session = SessionManager::new(
            collaborators.connector,
            store.clone(),
            SessionConfig {
                reconnect: settings.realtime.reconnect_policy(),
                default_model: settings.realtime.default_model.clone(),
            },
            &shutdown,
        );

        let (logout_tx, logged_out) = watch::channel(None);
        let on_logout: LogoutCallback = Arc::new(move |reason| {
            logout_tx.send_replace(Some(reason));
        });
        let token_guard = TokenGuard::new(session.clone(), on_logout, &shutdown);

        let scheduler = TransferScheduler::new(
            collaborators.documents.clone(),
            store.clone(),
            AdmissionPolicy::from(&settings.transfers),
            SchedulerConfig {
                tag_retry: RetryConfig {
                    max_retries: settings.api.max_retries,
                    ..RetryConfig::quick()
                },
                ..SchedulerConfig::from(&settings.transfers)
            },
            &shutdown,
        );

        Self {
            settings,
            credential,
            store,
            session,
            token_guard,
            scheduler,
            documents: collaborators.documents,
            chat: collaborators.chat,
            logged_out,
            shutdown,
        }
    }

    /// Arm the expiry timer and open the realtime session.
    pub async fn start(&self) -> Result<(), ClientError> {
        let delay = self.token_guard.track(&self.credential);
        tracing::info!(
            subject = self.credential.subject().unwrap_or("unknown"),
            expires_in_secs = delay.as_secs(),
            "Starting assistant client"
        );
        self.session.open(self.credential.clone()).await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn scheduler(&self) -> &TransferScheduler {
        &self.scheduler
    }

    /// Resolves with the reason once the credential has expired.
    pub fn logged_out(&self) -> watch::Receiver<Option<CloseReason>> {
        self.logged_out.clone()
    }

    pub async fn send_message(&self, content: &str) -> Result<u64, ClientError> {
        self.session.send(content, None).await
    }

    pub fn submit(&self, file: FileSubmission) -> Result<TaskId, ClientError> {
        self.scheduler.submit(file)
    }

    /// Ask the server how far it got with a file. Tasks still under a local id
    /// have nothing to ask about.
    pub async fn task_status(&self, id: &TaskId) -> Result<FileStatusResponse, ClientError> {
        let task = self
            .scheduler
            .task(id)
            .ok_or_else(|| ClientError::TaskNotFound(id.to_string()))?;
        if task.id.is_local() {
            return Err(ClientError::InvalidTransition(format!(
                "task {} has not reached the server yet",
                task.id
            )));
        }

        let policy = RetryConfig::with_max_retries(self.settings.api.max_retries);
        retry_call(&policy, "file_status", || {
            self.documents.file_status(task.id.as_str())
        })
        .await
    }

    /// Rewrite a stored message and append the result as a new assistant message.
    pub async fn apply_action(&self, action: MessageAction, seq: u64) -> Result<u64, ClientError> {
        let source = self
            .store
            .message(seq)
            .ok_or(ClientError::MessageNotFound(seq))?;
        let model = self.model_for(&source);

        tracing::info!(seq, action = action.as_str(), "Applying message action");
        let response = self
            .chat
            .apply_action(action, &source.content, &model)
            .await?;

        let message = RealtimeMessage::derived(
            response.content.clone(),
            action,
            seq,
            source.content,
        )
        .with_retrieval_context(response.retrieval_context())
        .with_model(response.model.or(Some(model)));

        Ok(self.store.append_message(message))
    }

    pub async fn export_message(&self, seq: u64) -> Result<ExportResponse, ClientError> {
        let source = self
            .store
            .message(seq)
            .ok_or(ClientError::MessageNotFound(seq))?;
        let model = self.model_for(&source);
        self.chat.export(&source.content, &model).await
    }

    /// Clear the server-side history, then the local messages. Returns how many
    /// local messages were removed.
    pub async fn clear_history(&self) -> Result<usize, ClientError> {
        self.chat.clear_history().await?;
        Ok(self.store.clear_messages())
    }

    pub async fn reindex(&self) -> Result<StatusMessageResponse, ClientError> {
        self.chat.reindex().await
    }

    /// Track server files this client has not seen yet. Returns how many were added.
    pub async fn sync_remote_files(&self) -> Result<usize, ClientError> {
        let policy = RetryConfig::with_max_retries(self.settings.api.max_retries);
        let files = retry_call(&policy, "list_files", || self.documents.list_files()).await?;

        let known: HashSet<TaskId> = self.store.tasks().into_iter().map(|t| t.id).collect();
        let mut added = 0;
        for file in files {
            let task = TransferTask::from(file);
            if !known.contains(&task.id) {
                self.store.insert_task(task);
                added += 1;
            }
        }

        tracing::info!(added, "Remote files synchronised");
        Ok(added)
    }

    /// Explicit logout: disarm the expiry timer and close without reconnect.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.token_guard.cancel();
        self.session.close(CloseReason::UserLogout).await
    }

    /// Cancel every timer, abort transfers and close the session.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down assistant client");
        self.token_guard.cancel();
        self.scheduler.shutdown();
        self.session.shutdown().await;
        self.shutdown.cancel();
    }

    fn model_for(&self, message: &RealtimeMessage) -> String {
        message
            .model
            .clone()
            .or_else(|| self.settings.realtime.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }
}
