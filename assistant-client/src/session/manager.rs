//! Realtime session lifecycle.
//!
//! A single actor task owns all session state. [`SessionManager`] is a
//! cloneable handle that sends it commands; connection activity and reconnect
//! timers report back as events tagged with the connection generation, and
//! events from a generation that has since been torn down are ignored.

use crate::auth::Credential;
use crate::dtos::{InboundFrame, OutboundFrame};
use crate::models::{CloseReason, RealtimeMessage, SessionSnapshot, SessionState};
use crate::store::StatusStore;
use chrono::Utc;
use client_core::retry::RetryConfig;
use client_core::timer::ScheduledTask;
use client_core::ClientError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::transport::{Connection, Connector, TransportEvent};

const PERMANENTLY_LOST: &str = "connection permanently lost";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `max_retries` bounds consecutive reconnect attempts.
    pub reconnect: RetryConfig,
    /// Model requested when `send` does not name one.
    pub default_model: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: RetryConfig::exponential(
                5,
                std::time::Duration::from_millis(1000),
                std::time::Duration::from_millis(30_000),
            ),
            default_model: None,
        }
    }
}

enum Command {
    Open {
        credential: Credential,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Send {
        content: String,
        model: Option<String>,
        reply: oneshot::Sender<Result<u64, ClientError>>,
    },
    Close {
        reason: CloseReason,
        reply: oneshot::Sender<()>,
    },
}

enum Event {
    Established {
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closed {
        generation: u64,
        reason: CloseReason,
    },
    ReconnectDue {
        generation: u64,
    },
}

#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Spawn the session actor. It stops when `parent` is cancelled.
    pub fn new(
        connector: Arc<dyn Connector>,
        store: StatusStore,
        config: SessionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (watch_tx, watch_rx) = watch::channel(SessionSnapshot::default());
        let shutdown = parent.child_token();

        let actor = SessionActor {
            connector,
            store,
            config,
            snapshot: SessionSnapshot::default(),
            credential: None,
            generation: 0,
            outbound: None,
            connection: None,
            reconnect_timer: None,
            events: events_tx,
            watch: watch_tx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            snapshot: watch_rx,
            shutdown,
        }
    }

    /// Open a channel for `credential`, replacing any live one.
    pub async fn open(&self, credential: Credential) -> Result<(), ClientError> {
        self.request(|reply| Command::Open { credential, reply })
            .await?
    }

    /// Send a user message. Fails with `NotConnected` unless Connected; nothing
    /// is buffered. Returns the sequence number of the stored user message.
    pub async fn send(
        &self,
        content: impl Into<String>,
        model: Option<String>,
    ) -> Result<u64, ClientError> {
        let content = content.into();
        self.request(|reply| Command::Send {
            content,
            model,
            reply,
        })
        .await?
    }

    /// Tear down the channel and go to Disconnected without reconnecting.
    pub async fn close(&self, reason: CloseReason) -> Result<(), ClientError> {
        self.request(|reply| Command::Close { reason, reply }).await
    }

    /// Close with `Teardown` and stop the actor.
    pub async fn shutdown(&self) {
        if let Err(e) = self.close(CloseReason::Teardown).await {
            tracing::debug!(error = %e, "Session actor already stopped");
        }
        self.shutdown.cancel();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ClientError::Transport("session actor stopped".to_string()))?;
        response
            .await
            .map_err(|_| ClientError::Transport("session actor stopped".to_string()))
    }
}

struct SessionActor {
    connector: Arc<dyn Connector>,
    store: StatusStore,
    config: SessionConfig,
    snapshot: SessionSnapshot,
    credential: Option<Credential>,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection: Option<JoinHandle<()>>,
    reconnect_timer: Option<ScheduledTask>,
    events: mpsc::UnboundedSender<Event>,
    watch: watch::Sender<SessionSnapshot>,
    shutdown: CancellationToken,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.publish();
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }

        self.teardown_channel();
        if self.snapshot.state != SessionState::Disconnected {
            self.snapshot.last_close_reason = Some(CloseReason::Teardown);
            self.set_state(SessionState::Disconnected);
        }
        tracing::info!("Session actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { credential, reply } => {
                let _ = reply.send(self.open(credential));
            }
            Command::Send {
                content,
                model,
                reply,
            } => {
                let _ = reply.send(self.send(content, model));
            }
            Command::Close { reason, reply } => {
                self.close(reason);
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Established {
                generation,
                outbound,
            } if generation == self.generation => {
                self.outbound = Some(outbound);
                self.snapshot.reconnect_attempt = 0;
                self.snapshot.backoff_ms = 0;
                self.snapshot.error = None;
                self.snapshot.requires_reauth = false;
                tracing::info!(generation, "Realtime session connected");
                self.set_state(SessionState::Connected);
            }
            Event::Frame { generation, text } if generation == self.generation => {
                self.receive(&text);
            }
            Event::Closed { generation, reason } if generation == self.generation => {
                self.outbound = None;
                self.connection = None;
                self.on_closed(reason);
            }
            Event::ReconnectDue { generation } if generation == self.generation => {
                self.reconnect_timer = None;
                self.reconnect();
            }
            _ => tracing::trace!("Ignoring event from a previous connection"),
        }
    }

    fn open(&mut self, credential: Credential) -> Result<(), ClientError> {
        if credential.is_expired() {
            tracing::warn!("Refusing to open session with an expired credential");
            return Err(ClientError::CredentialExpired);
        }

        if self.snapshot.state.is_live() {
            tracing::info!(
                state = ?self.snapshot.state,
                "Replacing live session channel"
            );
            self.teardown_channel();
            self.snapshot.last_close_reason = Some(CloseReason::Replaced);
        }

        // A fresh session starts its own reconnect budget
        self.snapshot.reconnect_attempt = 0;
        self.snapshot.backoff_ms = 0;
        self.snapshot.error = None;
        self.snapshot.requires_reauth = false;
        self.credential = Some(credential);
        self.connect();
        Ok(())
    }

    fn connect(&mut self) {
        let Some(credential) = self.credential.clone() else {
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        self.set_state(SessionState::Connecting);

        tracing::debug!(generation, "Opening realtime channel");
        self.connection = Some(tokio::spawn(drive_connection(
            generation,
            self.connector.clone(),
            credential,
            self.events.clone(),
        )));
    }

    fn send(&mut self, content: String, model: Option<String>) -> Result<u64, ClientError> {
        let outbound = match (&self.outbound, self.snapshot.state) {
            (Some(outbound), SessionState::Connected) => outbound,
            _ => return Err(ClientError::NotConnected),
        };

        let model = model.or_else(|| self.config.default_model.clone());
        let frame = OutboundFrame::user(content.clone(), model.clone());
        let text = serde_json::to_string(&frame)?;
        outbound
            .send(text)
            .map_err(|_| ClientError::NotConnected)?;

        Ok(self.store.append_message(RealtimeMessage::user(content, model)))
    }

    fn receive(&mut self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => {
                let seq = self.store.append_message(frame.into());
                tracing::debug!(seq, "Assistant message received");
            }
            Err(e) => {
                metrics::counter!("session_frames_dropped_total").increment(1);
                tracing::warn!(error = %e, "Dropping inbound frame");
            }
        }
    }

    fn close(&mut self, reason: CloseReason) {
        self.teardown_channel();

        if matches!(reason, CloseReason::UserLogout | CloseReason::Expired) {
            self.credential = None;
        }

        tracing::info!(reason = ?reason, "Closing realtime session");
        self.snapshot.requires_reauth = reason.requires_reauth();
        self.snapshot.backoff_ms = 0;
        self.snapshot.last_close_reason = Some(reason);
        self.set_state(SessionState::Disconnected);
    }

    fn on_closed(&mut self, reason: CloseReason) {
        self.snapshot.last_close_reason = Some(reason.clone());

        if reason.suppresses_reconnect() {
            tracing::info!(reason = ?reason, "Realtime session closed");
            self.snapshot.requires_reauth = reason.requires_reauth();
            if self.snapshot.requires_reauth {
                self.credential = None;
            }
            self.set_state(SessionState::Disconnected);
            return;
        }

        let credential_valid = self
            .credential
            .as_ref()
            .map(|c| !c.is_expired())
            .unwrap_or(false);
        if !credential_valid {
            self.expire();
            return;
        }

        self.snapshot.reconnect_attempt += 1;
        let attempt = self.snapshot.reconnect_attempt;

        if attempt > self.config.reconnect.max_retries {
            tracing::error!(
                attempts = attempt - 1,
                reason = ?reason,
                "Reconnect attempts exhausted"
            );
            self.snapshot.backoff_ms = 0;
            self.snapshot.error = Some(PERMANENTLY_LOST.to_string());
            self.set_state(SessionState::Failed);
            return;
        }

        let delay = self.config.reconnect.backoff_duration(attempt - 1);
        self.snapshot.backoff_ms = delay.as_millis() as u64;
        metrics::counter!("session_reconnects_total").increment(1);
        tracing::warn!(
            attempt,
            backoff_ms = self.snapshot.backoff_ms,
            reason = ?reason,
            "Realtime session lost, scheduling reconnect"
        );
        self.set_state(SessionState::Reconnecting);

        let events = self.events.clone();
        let generation = self.generation;
        self.reconnect_timer = Some(ScheduledTask::spawn(&self.shutdown, delay, async move {
            let _ = events.send(Event::ReconnectDue { generation });
        }));
    }

    fn reconnect(&mut self) {
        match &self.credential {
            Some(credential) if !credential.is_expired() => self.connect(),
            _ => self.expire(),
        }
    }

    /// Never reconnect with an expired credential.
    fn expire(&mut self) {
        tracing::warn!("Credential expired, not reconnecting");
        self.credential = None;
        self.snapshot.backoff_ms = 0;
        self.snapshot.requires_reauth = true;
        self.snapshot.last_close_reason = Some(CloseReason::Expired);
        self.set_state(SessionState::Disconnected);
    }

    /// Cancel the reconnect timer, stop the connection task and close the
    /// channel. Events already queued for this generation become stale.
    fn teardown_channel(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        // Dropping the sender closes the channel with code 1000
        self.outbound = None;
        self.generation += 1;
    }

    fn set_state(&mut self, state: SessionState) {
        self.snapshot.state = state;
        self.publish();
    }

    fn publish(&mut self) {
        self.snapshot.updated_at = Utc::now();
        self.watch.send_replace(self.snapshot.clone());
        self.store.set_session(self.snapshot.clone());
    }
}

async fn drive_connection(
    generation: u64,
    connector: Arc<dyn Connector>,
    credential: Credential,
    events: mpsc::UnboundedSender<Event>,
) {
    let Connection {
        outbound,
        mut inbound,
    } = match connector.connect(&credential).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(generation, error = %e, "Realtime connect failed");
            let _ = events.send(Event::Closed {
                generation,
                reason: CloseReason::abnormal(e.to_string()),
            });
            return;
        }
    };

    if events
        .send(Event::Established {
            generation,
            outbound,
        })
        .is_err()
    {
        return;
    }

    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Text(text) => {
                if events.send(Event::Frame { generation, text }).is_err() {
                    return;
                }
            }
            TransportEvent::Closed { code, reason } => {
                tracing::debug!(generation, code = ?code, reason = %reason, "Realtime channel closed");
                let _ = events.send(Event::Closed {
                    generation,
                    reason: CloseReason::from_close_code(code, reason),
                });
                return;
            }
        }
    }

    let _ = events.send(Event::Closed {
        generation,
        reason: CloseReason::abnormal("transport ended without close"),
    });
}
