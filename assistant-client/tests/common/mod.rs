#![allow(dead_code)]

use assistant_client::auth::Credential;
use assistant_client::config::Settings;
use assistant_client::dtos::{
    ActionResponse, ExportResponse, FileResponse, FileStatusResponse, StatusMessageResponse,
};
use assistant_client::models::MessageAction;
use assistant_client::services::{ChatApi, DocumentApi, ProgressFn};
use assistant_client::session::{Connection, Connector, TransportEvent};
use assistant_client::store::StatusStore;
use assistant_client::transfers::FileSubmission;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use client_core::ClientError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};

pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// Unsigned JWT-shaped token with the given `exp`.
pub fn make_token(exp: i64) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"sub":"test_user_123","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}

pub fn valid_credential() -> Credential {
    Credential::new(make_token(Utc::now().timestamp() + 3600))
}

pub fn expired_credential() -> Credential {
    Credential::new(make_token(Utc::now().timestamp() - 60))
}

pub fn test_settings(base_url: &str) -> Settings {
    let yaml = format!(
        r#"
api:
  base_url: "{base_url}"
  max_retries: 2
realtime:
  url: "ws://127.0.0.1:1/api/chat/ws"
  default_model: "qwen2"
transfers:
  max_concurrent: 3
  settle_delay_ms: 10
"#
    );
    Settings::from_yaml(&yaml).expect("Failed to parse test settings")
}

/// Wait until `condition` holds, re-checking on every store change.
pub async fn wait_until(store: &StatusStore, mut condition: impl FnMut(&StatusStore) -> bool) {
    let mut events = store.subscribe();
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition(store) {
            if let Err(tokio::sync::broadcast::error::RecvError::Closed) = events.recv().await {
                panic!("store notifier closed");
            }
        }
    })
    .await
    .expect("Condition not reached in time");
}

// --- Realtime channel -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectPlan {
    Accept,
    Refuse,
}

/// Server end of an accepted mock connection.
pub struct ServerHandle {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerHandle {
    pub fn push_text(&self, text: &str) {
        let _ = self.to_client.send(TransportEvent::Text(text.to_string()));
    }

    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next frame from the client; `None` once the client dropped its end.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT_LIMIT, self.from_client.recv())
            .await
            .expect("No frame from client in time")
    }
}

pub struct MockConnector {
    plans: Mutex<VecDeque<ConnectPlan>>,
    fallback: ConnectPlan,
    connects: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerHandle>,
}

impl MockConnector {
    /// Follows `plans` in order, then `fallback` for every later attempt.
    pub fn new(
        plans: Vec<ConnectPlan>,
        fallback: ConnectPlan,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plans: Mutex::new(plans.into()),
            fallback,
            connects: AtomicUsize::new(0),
            accepted,
        });
        (connector, servers)
    }

    pub fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerHandle>) {
        Self::new(Vec::new(), ConnectPlan::Accept)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _credential: &Credential) -> Result<Connection, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match plan {
            ConnectPlan::Refuse => Err(ClientError::Transport("connection refused".to_string())),
            ConnectPlan::Accept => {
                let (outbound, from_client) = mpsc::unbounded_channel();
                let (to_client, inbound) = mpsc::unbounded_channel();
                let _ = self.accepted.send(ServerHandle {
                    to_client,
                    from_client,
                });
                Ok(Connection { outbound, inbound })
            }
        }
    }
}

pub async fn next_server(servers: &mut mpsc::UnboundedReceiver<ServerHandle>) -> ServerHandle {
    tokio::time::timeout(WAIT_LIMIT, servers.recv())
        .await
        .expect("No connection accepted in time")
        .expect("Connector dropped")
}

// --- Document REST collaborator ---------------------------------------------

type UploadResult = Result<FileResponse, ClientError>;

/// Uploads block until the test answers them with [`MockDocumentApi::complete`]
/// or [`MockDocumentApi::fail`], unless `auto_complete` is set.
#[derive(Default)]
pub struct MockDocumentApi {
    pub auto_complete: AtomicBool,
    pub fail_tags: AtomicBool,
    waiting: Mutex<HashMap<String, oneshot::Sender<UploadResult>>>,
    arrived: Notify,
    tags: Mutex<HashMap<String, Vec<String>>>,
    remote_files: Mutex<Vec<FileResponse>>,
    deleted: Mutex<Vec<String>>,
    upload_calls: AtomicUsize,
    tag_calls: AtomicUsize,
    list_calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn file_id_for(filename: &str) -> String {
    format!("file-{}", filename)
}

pub fn file_response(file_id: &str, filename: &str, size: u64) -> FileResponse {
    FileResponse {
        file_id: file_id.to_string(),
        filename: filename.to_string(),
        content_type: "application/pdf".to_string(),
        size,
        user_id: Some("test_user_123".to_string()),
        created_at: Some("2024-05-01T10:00:00".to_string()),
    }
}

impl MockDocumentApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn auto() -> Arc<Self> {
        let api = Self::default();
        api.auto_complete.store(true, Ordering::SeqCst);
        Arc::new(api)
    }

    pub fn set_tags(&self, file_id: &str, tags: &[&str]) {
        self.tags.lock().unwrap().insert(
            file_id.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn set_remote_files(&self, files: Vec<FileResponse>) {
        *self.remote_files.lock().unwrap() = files;
    }

    /// Answer the pending upload of `filename` with a server id.
    pub async fn complete(&self, filename: &str) {
        let response = file_response(&file_id_for(filename), filename, 0);
        self.respond(filename, Ok(response)).await;
    }

    pub async fn fail(&self, filename: &str, error: ClientError) {
        self.respond(filename, Err(error)).await;
    }

    async fn respond(&self, filename: &str, result: UploadResult) {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                let arrived = self.arrived.notified();
                if let Some(sender) = self.waiting.lock().unwrap().remove(filename) {
                    let _ = sender.send(result);
                    return;
                }
                arrived.await;
            }
        })
        .await
        .expect("Upload never started");
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn tag_calls(&self) -> usize {
        self.tag_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentApi for MockDocumentApi {
    async fn upload(
        &self,
        file: &FileSubmission,
        progress: ProgressFn,
    ) -> Result<FileResponse, ClientError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight {
            counter: self.in_flight.clone(),
        };

        let total = file.byte_size();
        progress(total / 2, total);

        let result = if self.auto_complete.load(Ordering::SeqCst) {
            Ok(file_response(
                &file_id_for(&file.filename),
                &file.filename,
                total,
            ))
        } else {
            let (sender, receiver) = oneshot::channel();
            self.waiting
                .lock()
                .unwrap()
                .insert(file.filename.clone(), sender);
            self.arrived.notify_waiters();
            receiver
                .await
                .unwrap_or(Err(ClientError::Cancelled))
        };

        if result.is_ok() {
            progress(total, total);
        }
        result
    }

    async fn fetch_tags(&self, file_id: &str) -> Result<Vec<String>, ClientError> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tags.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 500,
                message: "Error getting file tags".to_string(),
            });
        }
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn file_status(&self, file_id: &str) -> Result<FileStatusResponse, ClientError> {
        Ok(FileStatusResponse {
            file_id: file_id.to_string(),
            status: "processed".to_string(),
        })
    }

    async fn list_files(&self) -> Result<Vec<FileResponse>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote_files.lock().unwrap().clone())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ClientError> {
        self.deleted.lock().unwrap().push(file_id.to_string());
        Ok(())
    }
}

// --- Chat REST collaborator -------------------------------------------------

#[derive(Default)]
pub struct MockChatApi {
    pub requests: Mutex<Vec<(MessageAction, String, String)>>,
    pub cleared: AtomicUsize,
}

impl MockChatApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn apply_action(
        &self,
        action: MessageAction,
        content: &str,
        model: &str,
    ) -> Result<ActionResponse, ClientError> {
        self.requests
            .lock()
            .unwrap()
            .push((action, content.to_string(), model.to_string()));
        Ok(ActionResponse {
            content: format!("{}: {}", action.as_str(), content),
            rag_context: Vec::new(),
            model: Some(model.to_string()),
        })
    }

    async fn export(&self, _content: &str, _model: &str) -> Result<ExportResponse, ClientError> {
        Ok(ExportResponse {
            message: "Message exported successfully".to_string(),
            file_path: Some("exports/message.md".to_string()),
        })
    }

    async fn clear_history(&self) -> Result<StatusMessageResponse, ClientError> {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        Ok(StatusMessageResponse {
            status: "success".to_string(),
            message: Some("Chat history cleared".to_string()),
        })
    }

    async fn reindex(&self) -> Result<StatusMessageResponse, ClientError> {
        Ok(StatusMessageResponse {
            status: "success".to_string(),
            message: Some("Reindexed".to_string()),
        })
    }
}
