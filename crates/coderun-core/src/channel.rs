//! Channel adapter owning the single connection to the execution engine.
//!
//! One adapter exists per authenticated identity. It opens the connection
//! lazily, keeps it across many sessions, forwards commands in issue order,
//! and hands every inbound event to whichever session currently holds the
//! channel. Only one session can hold it at a time, so routing is
//! single-target.

use crate::{ChannelConfig, CoderunError, ReconnectPolicy, Result, WebSocketConnector};
use async_trait::async_trait;
use coderun_types::{ExecutionCommand, ExecutionEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An open connection: commands go out, decoded events come back.
///
/// The event stream ends (or yields `ChannelError`) when the transport drops.
pub struct Connection {
    pub commands: mpsc::UnboundedSender<ExecutionCommand>,
    pub events: mpsc::UnboundedReceiver<ExecutionEvent>,
}

/// Opens connections to the execution engine.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> String;
}

/// What an execution session needs from the channel.
pub trait CommandChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Take exclusive use of the channel for a run.
    fn claim(&self, session_id: Uuid) -> Result<()>;

    /// Give the channel back. No-op if `session_id` does not hold it.
    fn release(&self, session_id: Uuid);

    /// Queue a command. Never blocks; fails if the session does not hold the
    /// channel or the connection is gone.
    fn send(&self, session_id: Uuid, command: ExecutionCommand) -> Result<()>;
}

/// Connection status as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Attempts made by the current (or last failed) establishment.
    pub connection_attempts: u32,
    pub active_session: Option<Uuid>,
    pub endpoint: String,
}

#[derive(Default)]
struct AdapterState {
    outbound: Option<mpsc::UnboundedSender<ExecutionCommand>>,
    /// Bumped per connection so a stale dispatcher cannot touch a newer one.
    generation: u64,
    connection_attempts: u32,
    routes: HashMap<Uuid, mpsc::UnboundedSender<ExecutionEvent>>,
    active: Option<Uuid>,
}

impl AdapterState {
    fn is_connected(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Deliver an event to the session holding the channel.
    fn deliver(&mut self, event: ExecutionEvent) {
        let Some(active) = self.active else {
            debug!(target: "coderun::channel", "Dropping {} with no active session", event.name());
            return;
        };
        match self.routes.get(&active) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!(target: "coderun::channel", "Session {} is gone; releasing channel", active);
                    self.routes.remove(&active);
                    self.active = None;
                }
            }
            None => {
                warn!(target: "coderun::channel", "Active session {} has no route; releasing channel", active);
                self.active = None;
            }
        }
    }

    /// Mark the connection dead and tell the active session, once.
    fn connection_lost(&mut self, reason: String) {
        self.outbound = None;
        if self.active.is_some() {
            self.deliver(ExecutionEvent::ChannelError { reason });
        }
        self.active = None;
    }
}

struct AdapterInner {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    /// Serialises connection establishment.
    connect_lock: tokio::sync::Mutex<()>,
    state: Mutex<AdapterState>,
}

impl AdapterInner {
    fn state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, generation: u64, event: ExecutionEvent) {
        let mut state = self.state();
        if state.generation != generation {
            debug!(target: "coderun::channel", "Dropping {} from a replaced connection", event.name());
            return;
        }
        match event {
            ExecutionEvent::ChannelError { reason } => {
                if state.outbound.is_some() {
                    warn!(target: "coderun::channel", "Connection to {} lost: {}", self.connector.endpoint(), reason);
                    state.connection_lost(reason);
                }
            }
            event => state.deliver(event),
        }
    }

    fn stream_ended(&self, generation: u64) {
        let mut state = self.state();
        if state.generation == generation && state.outbound.is_some() {
            warn!(target: "coderun::channel", "Connection to {} closed", self.connector.endpoint());
            state.connection_lost("disconnect: connection closed".to_string());
        }
    }
}

/// Shared handle to the engine connection. Cheap to clone.
#[derive(Clone)]
pub struct ChannelAdapter {
    inner: Arc<AdapterInner>,
}

impl ChannelAdapter {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                connector,
                policy,
                connect_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(AdapterState::default()),
            }),
        }
    }

    /// Adapter backed by the WebSocket connector.
    pub fn websocket(config: &ChannelConfig) -> Self {
        Self::new(Arc::new(WebSocketConnector::new(config)), config.reconnect)
    }

    /// Register a session to receive events while it holds the channel.
    pub fn register(&self, session_id: Uuid) -> mpsc::UnboundedReceiver<ExecutionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.state().routes.insert(session_id, tx);
        debug!(target: "coderun::channel", "Registered session {}", session_id);
        rx
    }

    /// Forget a session (editor surface unmounted).
    pub fn unregister(&self, session_id: Uuid) {
        let mut state = self.inner.state();
        state.routes.remove(&session_id);
        if state.active == Some(session_id) {
            state.active = None;
        }
        debug!(target: "coderun::channel", "Unregistered session {}", session_id);
    }

    /// Open the connection if it is not already open.
    ///
    /// Tries up to `policy.max_attempts` times with linear backoff.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let _guard = self.inner.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let endpoint = self.inner.connector.endpoint();
        let max_attempts = self.inner.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.inner.state().connection_attempts = attempt;
            info!(
                target: "coderun::channel",
                "Connecting to {} (attempt {}/{})",
                endpoint, attempt, max_attempts
            );

            match self.inner.connector.connect().await {
                Ok(connection) => {
                    self.install(connection);
                    info!(target: "coderun::channel", "Connected to {}", endpoint);
                    return Ok(());
                }
                Err(e) => {
                    warn!(target: "coderun::channel", "connect_error on attempt {}: {}", attempt, e);
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.inner.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        Err(CoderunError::ChannelError(format!(
            "could not connect to {} after {} attempts: {}",
            endpoint, max_attempts, last_error
        )))
    }

    fn install(&self, connection: Connection) {
        let Connection {
            commands,
            mut events,
        } = connection;

        let generation = {
            let mut state = self.inner.state();
            state.generation += 1;
            state.outbound = Some(commands);
            state.connection_attempts = 0;
            state.generation
        };

        let weak: Weak<AdapterInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.dispatch(generation, event);
            }
            if let Some(inner) = weak.upgrade() {
                inner.stream_ended(generation);
            }
        });
    }

    /// Close the connection. An active run observes a `ChannelError`.
    pub fn disconnect(&self) {
        let mut state = self.inner.state();
        if state.outbound.is_none() {
            return;
        }
        info!(target: "coderun::channel", "Disconnecting from {}", self.inner.connector.endpoint());
        state.generation += 1;
        state.connection_attempts = 0;
        state.connection_lost("disconnect: closed by client".to_string());
    }

    pub fn status(&self) -> ConnectionStatus {
        let state = self.inner.state();
        ConnectionStatus {
            connected: state.is_connected(),
            connection_attempts: state.connection_attempts,
            active_session: state.active,
            endpoint: self.inner.connector.endpoint(),
        }
    }

    pub fn active_session(&self) -> Option<Uuid> {
        self.inner.state().active
    }
}

impl CommandChannel for ChannelAdapter {
    fn is_connected(&self) -> bool {
        self.inner.state().is_connected()
    }

    fn claim(&self, session_id: Uuid) -> Result<()> {
        let mut state = self.inner.state();
        match state.active {
            Some(holder) if holder != session_id => Err(CoderunError::SessionBusy(holder)),
            _ => {
                state.active = Some(session_id);
                debug!(target: "coderun::channel", "Session {} claimed the channel", session_id);
                Ok(())
            }
        }
    }

    fn release(&self, session_id: Uuid) {
        let mut state = self.inner.state();
        if state.active == Some(session_id) {
            state.active = None;
            debug!(target: "coderun::channel", "Session {} released the channel", session_id);
        }
    }

    fn send(&self, session_id: Uuid, command: ExecutionCommand) -> Result<()> {
        let mut state = self.inner.state();
        if state.active != Some(session_id) {
            return Err(CoderunError::ChannelError(format!(
                "session {} does not hold the channel",
                session_id
            )));
        }

        let Some(outbound) = state.outbound.as_ref() else {
            return Err(CoderunError::ChannelError("not connected".to_string()));
        };

        let name = command.name();
        if outbound.send(command).is_err() {
            state.outbound = None;
            return Err(CoderunError::ChannelError("connection closed".to_string()));
        }
        debug!(target: "coderun::channel", "Queued {} for session {}", name, session_id);
        Ok(())
    }
}
