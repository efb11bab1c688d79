//! Task that drives one [`ExecutionSession`].
//!
//! Caller actions, routed engine events and the stop deadline are all
//! serialised through a single task, so the session never sees two inputs
//! at once. Callers talk to it through a cloneable [`SessionHandle`].

use crate::input::Key;
use crate::{ChannelAdapter, CoderunError, ExecutionSession, Result, SessionConfig, SessionEvent};
use coderun_types::{ExecutionEvent, SessionSnapshot, SessionState};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

enum SessionAction {
    Start {
        code: Option<String>,
        language: Option<String>,
        initial_input: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Key {
        key: Key,
        reply: oneshot::Sender<bool>,
    },
    SubmitLine {
        text: String,
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetSourceCode(String),
    SetLanguage(String),
}

pub struct SessionRunner;

impl SessionRunner {
    /// Mount a session on `adapter` and start its task.
    ///
    /// The session lives until every handle is dropped; then any active run
    /// is stopped and the session is unregistered from the adapter.
    pub fn spawn(adapter: ChannelAdapter, language: impl Into<String>, config: SessionConfig) -> SessionHandle {
        let id = Uuid::new_v4();
        let events_rx = adapter.register(id);
        let session = ExecutionSession::new(id, language, Arc::new(adapter.clone()), config);

        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let event_tx = session.event_sender();
        let (action_tx, action_rx) = mpsc::channel(64);

        info!(target: "coderun::session", "Mounted session {}", id);
        tokio::spawn(drive(session, adapter, action_rx, events_rx, snapshot_tx));

        SessionHandle {
            id,
            actions: action_tx,
            snapshot: snapshot_rx,
            events: event_tx,
        }
    }
}

async fn drive(
    mut session: ExecutionSession,
    adapter: ChannelAdapter,
    mut actions: mpsc::Receiver<SessionAction>,
    mut events: mpsc::UnboundedReceiver<ExecutionEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
) {
    loop {
        let deadline = session.stop_deadline();
        tokio::select! {
            action = actions.recv() => match action {
                Some(action) => apply(&mut session, &adapter, action, &snapshot_tx).await,
                None => break,
            },
            Some(event) = events.recv() => session.handle_event(event),
            _ = deadline_elapsed(deadline) => {
                session.poll_stop_timeout(Instant::now());
            }
        }
        snapshot_tx.send_replace(session.snapshot());
    }

    let id = session.id();
    session.shutdown();
    adapter.unregister(id);
    snapshot_tx.send_replace(session.snapshot());
    info!(target: "coderun::session", "Unmounted session {}", id);
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

async fn apply(
    session: &mut ExecutionSession,
    adapter: &ChannelAdapter,
    action: SessionAction,
    snapshot_tx: &watch::Sender<SessionSnapshot>,
) {
    match action {
        SessionAction::Start {
            code,
            language,
            initial_input,
            reply,
        } => {
            let code = code.unwrap_or_else(|| session.source_code().to_string());
            let language = language.unwrap_or_else(|| session.language().to_string());

            let result = match session.check_start(&code, &language) {
                Ok(_) => match adapter.ensure_connected().await {
                    Ok(()) => session.start(&code, &language, initial_input),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            snapshot_tx.send_replace(session.snapshot());
            let _ = reply.send(result);
        }
        SessionAction::Key { key, reply } => {
            let handled = session.key(key);
            snapshot_tx.send_replace(session.snapshot());
            let _ = reply.send(handled);
        }
        SessionAction::SubmitLine { text, reply } => {
            let handled = session.submit_line(&text);
            snapshot_tx.send_replace(session.snapshot());
            let _ = reply.send(handled);
        }
        SessionAction::Stop { reply } => {
            session.stop(Instant::now());
            snapshot_tx.send_replace(session.snapshot());
            let _ = reply.send(());
        }
        SessionAction::SetSourceCode(code) => session.set_source_code(code),
        SessionAction::SetLanguage(label) => {
            debug!(target: "coderun::session", "Session {} language set to {}", session.id(), label);
            session.set_language(label);
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    actions: mpsc::Sender<SessionAction>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionAction) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.actions
            .send(build(reply_tx))
            .await
            .map_err(|_| CoderunError::SessionClosed(self.id))?;
        reply_rx.await.map_err(|_| CoderunError::SessionClosed(self.id))
    }

    async fn post(&self, action: SessionAction) -> Result<()> {
        self.actions
            .send(action)
            .await
            .map_err(|_| CoderunError::SessionClosed(self.id))
    }

    /// Start a run, connecting to the engine first if needed.
    pub async fn start(&self, code: impl Into<String>, language: impl Into<String>) -> Result<()> {
        self.start_with_input(code, language, None).await
    }

    /// Start a run with text written to the program's stdin up front.
    pub async fn start_with_input(
        &self,
        code: impl Into<String>,
        language: impl Into<String>,
        initial_input: Option<String>,
    ) -> Result<()> {
        let code = code.into();
        let language = language.into();
        self.request(|reply| SessionAction::Start {
            code: Some(code),
            language: Some(language),
            initial_input,
            reply,
        })
        .await?
    }

    /// Run the editor's current buffer and language.
    pub async fn run(&self) -> Result<()> {
        self.request(|reply| SessionAction::Start {
            code: None,
            language: None,
            initial_input: None,
            reply,
        })
        .await?
    }

    pub async fn key(&self, key: Key) -> Result<bool> {
        self.request(|reply| SessionAction::Key { key, reply }).await
    }

    pub async fn submit_line(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| SessionAction::SubmitLine { text, reply })
            .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| SessionAction::Stop { reply }).await
    }

    pub async fn set_source_code(&self, code: impl Into<String>) -> Result<()> {
        self.post(SessionAction::SetSourceCode(code.into())).await
    }

    pub async fn set_language(&self, label: impl Into<String>) -> Result<()> {
        self.post(SessionAction::SetLanguage(label.into())).await
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn transcript(&self) -> String {
        self.snapshot.borrow().transcript.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Wait for the run to settle, turning `Errored` into its error.
    pub async fn wait_for_outcome(&self) -> Result<SessionSnapshot> {
        let settled = self.wait_until_settled().await?;
        match (settled.state, settled.failure) {
            (SessionState::Errored, Some(kind)) => Err(CoderunError::from_failure(
                kind,
                settled.last_error.unwrap_or_default(),
            )),
            _ => Ok(settled),
        }
    }

    /// Wait until no run is in flight.
    pub async fn wait_until_settled(&self) -> Result<SessionSnapshot> {
        let mut snapshot = self.snapshot.clone();
        let settled = snapshot
            .wait_for(|s| !s.state.is_active())
            .await
            .map_err(|_| CoderunError::SessionClosed(self.id))?
            .clone();
        Ok(settled)
    }
}
