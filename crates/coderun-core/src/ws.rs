//! WebSocket transport to the execution engine.

use crate::{ChannelConfig, CoderunError, Connection, Connector, Result};
use async_trait::async_trait;
use coderun_types::{ClientFrame, EngineFrame, ExecutionCommand, ExecutionEvent};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Opens authenticated WebSocket connections to the engine.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    token: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            url: config.url.clone(),
            token: config.token.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    fn request(&self) -> Result<Request> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| CoderunError::ChannelError(format!("invalid token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Connection> {
        let request = self.request()?;

        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                CoderunError::ChannelError(format!(
                    "connect_error: timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;

        info!(target: "coderun::ws", "WebSocket open to {}", self.url);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws_stream, commands_rx, events_tx));

        Ok(Connection {
            commands: commands_tx,
            events: events_rx,
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Shuttle frames between the socket and the adapter until either side ends.
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut commands: mpsc::UnboundedReceiver<ExecutionCommand>,
    events: mpsc::UnboundedSender<ExecutionEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    let name = command.name();
                    let json = match ClientFrame::from(command).encode() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(target: "coderun::ws", "Failed to encode {}: {}", name, e);
                            continue;
                        }
                    };
                    debug!(target: "coderun::ws", "-> {}", json);
                    if let Err(e) = ws_tx.send(Message::Text(json)).await {
                        let _ = events.send(ExecutionEvent::channel_error(format!("disconnect: {}", e)));
                        break;
                    }
                }
                None => {
                    debug!(target: "coderun::ws", "Adapter dropped the connection; closing socket");
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            },
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => match EngineFrame::decode(&text) {
                    Ok(Some(frame)) => {
                        if events.send(frame.into()).is_err() {
                            break;
                        }
                    }
                    Ok(None) => debug!(target: "coderun::ws", "Skipping unhandled frame: {}", text),
                    Err(e) => warn!(target: "coderun::ws", "Malformed frame from engine: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by engine".to_string());
                    info!(target: "coderun::ws", "Engine closed the connection: {}", reason);
                    let _ = events.send(ExecutionEvent::channel_error(format!("disconnect: {}", reason)));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(target: "coderun::ws", "WebSocket error: {}", e);
                    let _ = events.send(ExecutionEvent::channel_error(format!("disconnect: {}", e)));
                    break;
                }
                None => {
                    let _ = events.send(ExecutionEvent::channel_error("disconnect: stream ended"));
                    break;
                }
            }
        }
    }
}
