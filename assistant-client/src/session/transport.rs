//! Duplex channel abstraction used by the session actor.

use crate::auth::Credential;
use crate::models::CLOSE_NORMAL;
use async_trait::async_trait;
use client_core::ClientError;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Text(String),
    /// The channel is gone. `code` is `None` when no close frame was received.
    Closed { code: Option<u16>, reason: String },
}

/// One open channel.
///
/// Dropping `outbound` closes the channel with code 1000. `inbound` ends with
/// exactly one `Closed` event.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, credential: &Credential) -> Result<Connection, ClientError>;
}

/// WebSocket connector. The credential travels as the `token` query parameter.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn endpoint(&self, credential: &Credential) -> Result<String, ClientError> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| ClientError::Transport(format!("Invalid realtime URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("token", credential.token());
        Ok(url.to_string())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, credential: &Credential) -> Result<Connection, ClientError> {
        let endpoint = self.endpoint(credential)?;

        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| ClientError::Transport(format!("WebSocket connect failed: {}", e)))?;

        tracing::debug!(url = %self.url, "WebSocket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let closed = loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => match outgoing {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                break TransportEvent::Closed { code: None, reason: e.to_string() };
                            }
                        }
                        None => break close_normally(&mut sink, "client closed").await,
                    },
                    incoming = source.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(TransportEvent::Text(text)).is_err() {
                                break close_normally(&mut sink, "receiver dropped").await;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break match frame {
                                Some(frame) => TransportEvent::Closed {
                                    code: Some(u16::from(frame.code)),
                                    reason: frame.reason.to_string(),
                                },
                                None => TransportEvent::Closed {
                                    code: None,
                                    reason: "closed without status".to_string(),
                                },
                            };
                        }
                        // Ping/pong are answered by tungstenite; binary frames are not part of the protocol
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            break TransportEvent::Closed { code: None, reason: e.to_string() };
                        }
                        None => {
                            break TransportEvent::Closed {
                                code: None,
                                reason: "stream ended".to_string(),
                            };
                        }
                    }
                }
            };

            tracing::debug!(event = ?closed, "WebSocket pump finished");
            let _ = inbound_tx.send(closed);
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Send a 1000 close frame and shut the sink down.
async fn close_normally<S>(sink: &mut S, reason: &str) -> TransportEvent
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: reason.to_string().into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
    TransportEvent::Closed {
        code: Some(CLOSE_NORMAL),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_appended_as_query_parameter() {
        let connector = WebSocketConnector::new("ws://localhost:8000/api/chat/ws");
        let credential = Credential::new("a.b.c");
        assert_eq!(
            connector.endpoint(&credential).unwrap(),
            "ws://localhost:8000/api/chat/ws?token=a.b.c"
        );
    }

    #[test]
    fn test_invalid_url_is_a_transport_error() {
        let connector = WebSocketConnector::new("not a url");
        assert!(matches!(
            connector.endpoint(&Credential::new("a.b.c")),
            Err(ClientError::Transport(_))
        ));
    }
}
