//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use coderun_core::{
    ChannelAdapter, CoderunError, Connection, Connector, ReconnectPolicy, Result, SessionHandle,
};
use coderun_types::{ExecutionCommand, ExecutionEvent, SessionSnapshot, SessionState};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound on any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// The engine's side of one scripted connection.
pub struct EngineLink {
    pub commands: mpsc::UnboundedReceiver<ExecutionCommand>,
    pub events: mpsc::UnboundedSender<ExecutionEvent>,
}

impl EngineLink {
    /// Next command the client sent, failing the test on timeout.
    pub async fn expect_command(&mut self) -> ExecutionCommand {
        tokio::time::timeout(WAIT, self.commands.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("client closed the connection")
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.events.send(event).expect("client dropped the event stream");
    }

    pub fn output(&self, text: &str) {
        self.emit(ExecutionEvent::OutputChunk {
            text: text.to_string(),
            is_error: false,
        });
    }

    pub fn waiting(&self, waiting: bool) {
        self.emit(ExecutionEvent::InputRequested { waiting });
    }

    pub fn result(&self, ok: bool, message: Option<&str>) {
        self.emit(ExecutionEvent::Terminated {
            ok,
            message: message.map(str::to_string),
        });
    }
}

/// In-memory connector handing each new connection to the test.
pub struct ScriptedConnector {
    links: mpsc::UnboundedSender<EngineLink>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl ScriptedConnector {
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(CoderunError::ChannelError("connect_error: refused".to_string()));
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.links
            .send(EngineLink {
                commands: commands_rx,
                events: events_tx,
            })
            .map_err(|_| CoderunError::ChannelError("test dropped".to_string()))?;

        Ok(Connection {
            commands: commands_tx,
            events: events_rx,
        })
    }

    fn endpoint(&self) -> String {
        "scripted://engine".to_string()
    }
}

/// Adapter over a scripted engine whose first `failures` connects fail.
pub fn scripted_adapter(
    failures: u32,
) -> (
    ChannelAdapter,
    Arc<ScriptedConnector>,
    mpsc::UnboundedReceiver<EngineLink>,
) {
    let (links_tx, links_rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector {
        links: links_tx,
        failures_left: AtomicU32::new(failures),
        attempts: AtomicU32::new(0),
    });
    let policy = ReconnectPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    };
    let adapter = ChannelAdapter::new(connector.clone(), policy);
    (adapter, connector, links_rx)
}

pub async fn next_link(links: &mut mpsc::UnboundedReceiver<EngineLink>) -> EngineLink {
    tokio::time::timeout(WAIT, links.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

/// Wait for the session to reach `state`.
pub async fn wait_for_state(handle: &SessionHandle, state: SessionState) -> SessionSnapshot {
    let mut watch = handle.watch();
    let snapshot = tokio::time::timeout(WAIT, watch.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}, still {}", state, handle.state()))
        .expect("session task ended");
    snapshot.clone()
}

/// Wait until the transcript satisfies `predicate`.
pub async fn wait_for_transcript(handle: &SessionHandle, predicate: impl Fn(&str) -> bool) -> String {
    let mut watch = handle.watch();
    let snapshot = tokio::time::timeout(WAIT, watch.wait_for(|s| predicate(&s.transcript)))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting on transcript {:?}", handle.transcript()))
        .expect("session task ended");
    snapshot.transcript.clone()
}
