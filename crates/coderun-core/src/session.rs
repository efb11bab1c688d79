//! Execution session state machine.
//!
//! One session per editor surface. The session owns the transcript and the
//! input relay for its runs and reacts to two inputs: caller actions (start,
//! keys, stop) and engine events delivered by the channel adapter. Every
//! method here is synchronous and non-blocking; time enters only through
//! the `now` passed to [`ExecutionSession::stop`] and
//! [`ExecutionSession::poll_stop_timeout`].

use crate::input::{InputRelay, Key, RelayAction};
use crate::language::{LanguageResolver, ResolvedLanguage};
use crate::transcript::{TranscriptReconstructor, BACKSPACE};
use crate::{CommandChannel, CoderunError, Result, SessionConfig};
use chrono::{DateTime, Utc};
use coderun_types::{
    ExecutionCommand, ExecutionEvent, FailureKind, SessionSnapshot, SessionState, TextSource,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Fallback message when the engine reports failure without a reason.
const GENERIC_FAILURE: &str = "Execution failed";

/// Notification published on every observable change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        session_id: Uuid,
        old_state: SessionState,
        new_state: SessionState,
    },
    /// Full transcript after the change; `source` says who caused it.
    TranscriptUpdated {
        session_id: Uuid,
        transcript: String,
        source: TextSource,
    },
}

pub struct ExecutionSession {
    id: Uuid,
    state: SessionState,
    /// Editor selection. A run keeps the label it was started with.
    language: String,
    source_code: String,
    transcript: TranscriptReconstructor,
    relay: InputRelay,
    last_error: Option<String>,
    failure: Option<FailureKind>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    stop_deadline: Option<Instant>,
    config: SessionConfig,
    resolver: LanguageResolver,
    channel: Arc<dyn CommandChannel>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ExecutionSession {
    pub fn new(
        id: Uuid,
        language: impl Into<String>,
        channel: Arc<dyn CommandChannel>,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            id,
            state: SessionState::Idle,
            language: language.into(),
            source_code: String::new(),
            transcript: TranscriptReconstructor::new(),
            relay: InputRelay::new(),
            last_error: None,
            failure: None,
            started_at: None,
            finished_at: None,
            stop_deadline: None,
            config,
            resolver: LanguageResolver::default(),
            channel,
            event_tx,
        }
    }

    pub fn with_resolver(mut self, resolver: LanguageResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn transcript(&self) -> &str {
        self.transcript.as_str()
    }

    pub fn input_buffer(&self) -> &str {
        self.relay.buffer()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The error that ended the last run, if it ended in `Errored`.
    pub fn failure(&self) -> Option<CoderunError> {
        let message = self.last_error.clone()?;
        self.failure.map(|kind| CoderunError::from_failure(kind, message))
    }

    /// When a pending Stop gives up waiting for acknowledgement.
    pub fn stop_deadline(&self) -> Option<Instant> {
        self.stop_deadline
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.event_tx.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            language: self.language.clone(),
            transcript: self.transcript.as_str().to_string(),
            input_buffer: self.relay.buffer().to_string(),
            last_error: self.last_error.clone(),
            failure: self.failure,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// Replace the editor buffer. Does not affect a run in flight.
    pub fn set_source_code(&mut self, code: impl Into<String>) {
        self.source_code = code.into();
    }

    /// Change the editor's language. Does not affect a run in flight.
    pub fn set_language(&mut self, label: impl Into<String>) {
        self.language = label.into();
    }

    /// Checks a start request would pass without touching anything.
    pub fn check_start(&self, code: &str, language: &str) -> Result<ResolvedLanguage> {
        if self.state.is_active() {
            return Err(CoderunError::SessionBusy(self.id));
        }
        if code.trim().is_empty() {
            return Err(CoderunError::EmptySource);
        }
        self.resolver.resolve(language)
    }

    /// Run the editor's current buffer under its current language.
    pub fn run(&mut self) -> Result<()> {
        let code = self.source_code.clone();
        let language = self.language.clone();
        self.start(&code, &language, None)
    }

    /// Begin a run.
    ///
    /// Busy sessions, blank code and unknown languages are rejected before the
    /// channel is contacted. A run clears the previous transcript.
    pub fn start(&mut self, code: &str, language: &str, initial_input: Option<String>) -> Result<()> {
        let resolved = match self.check_start(code, language) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(target: "coderun::session", "Session {} rejected start: {}", self.id, e);
                return Err(e);
            }
        };

        if !self.channel.is_connected() {
            return Err(CoderunError::ChannelError(
                "not connected to execution engine".to_string(),
            ));
        }
        self.channel.claim(self.id)?;

        self.language = resolved.label;
        self.source_code = code.to_string();
        self.transcript.clear();
        self.relay.deactivate();
        self.last_error = None;
        self.failure = None;
        self.stop_deadline = None;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.set_state(SessionState::Starting);
        self.publish_transcript(TextSource::Remote);

        info!(
            target: "coderun::session",
            "Session {} starting {} run ({} bytes)",
            self.id,
            resolved.engine_id,
            code.len()
        );

        let command = ExecutionCommand::Start {
            code: code.to_string(),
            language_engine_id: resolved.engine_id,
            initial_input,
        };
        if let Err(e) = self.channel.send(self.id, command) {
            self.fail_channel(e.to_string());
        }
        Ok(())
    }

    /// Request termination of the active run.
    ///
    /// No-op unless a run is in flight and not already stopping.
    pub fn stop(&mut self, now: Instant) {
        if !self.state.can_stop() {
            debug!(target: "coderun::session", "Session {} ignoring stop in state {}", self.id, self.state);
            return;
        }

        self.relay.deactivate();
        self.stop_deadline = Some(now + self.config.stop_timeout);
        self.set_state(SessionState::Stopping);

        if let Err(e) = self.channel.send(self.id, ExecutionCommand::Stop) {
            warn!(target: "coderun::session", "Session {} could not send stop: {}", self.id, e);
            self.finish_stop("channel unavailable");
        }
    }

    /// Force `Idle` if a stop has waited past its deadline.
    pub fn poll_stop_timeout(&mut self, now: Instant) -> bool {
        match self.stop_deadline {
            Some(deadline) if self.state == SessionState::Stopping && now >= deadline => {
                warn!(
                    target: "coderun::session",
                    "Session {} stop not acknowledged after {:?}",
                    self.id,
                    self.config.stop_timeout
                );
                self.finish_stop("timeout");
                true
            }
            _ => false,
        }
    }

    /// Feed one keystroke. Returns whether it had any effect.
    pub fn key(&mut self, key: Key) -> bool {
        if self.state != SessionState::WaitingForInput {
            trace!(target: "coderun::input", "Session {} ignoring {:?} in state {}", self.id, key, self.state);
            return false;
        }

        match self.relay.handle_key(key) {
            None => false,
            Some(RelayAction::Echo(ch)) => {
                self.transcript.push(ch);
                self.publish_transcript(TextSource::LocalEcho);
                true
            }
            Some(RelayAction::Erase) => {
                self.transcript.push(BACKSPACE);
                self.publish_transcript(TextSource::LocalEcho);
                true
            }
            Some(RelayAction::Submit(line)) => {
                debug!(target: "coderun::input", "Session {} submitting {} chars", self.id, line.chars().count());
                if let Err(e) = self.channel.send(self.id, ExecutionCommand::SubmitInput { text: line }) {
                    self.fail_channel(e.to_string());
                    return true;
                }
                self.transcript.push('\n');
                self.publish_transcript(TextSource::LocalEcho);
                true
            }
        }
    }

    /// Type `text` then press Enter.
    pub fn submit_line(&mut self, text: &str) -> bool {
        if self.state != SessionState::WaitingForInput {
            return false;
        }
        for key in text.chars().filter_map(Key::from_char) {
            self.key(key);
        }
        self.key(Key::Enter)
    }

    /// Apply an event routed from the channel.
    pub fn handle_event(&mut self, event: ExecutionEvent) {
        trace!(
            target: "coderun::session",
            "Session {} received {} in state {}",
            self.id,
            event.name(),
            self.state
        );

        match event {
            ExecutionEvent::OutputChunk { text, is_error } => match self.state {
                SessionState::Starting => {
                    self.set_state(SessionState::Running);
                    self.append_output(&text, is_error);
                }
                SessionState::Running | SessionState::WaitingForInput | SessionState::Stopping => {
                    self.append_output(&text, is_error);
                }
                SessionState::Idle | SessionState::Completed | SessionState::Errored => {
                    debug!(target: "coderun::session", "Session {} dropping late output", self.id);
                }
            },
            ExecutionEvent::InputRequested { waiting: true } => {
                if matches!(self.state, SessionState::Starting | SessionState::Running) {
                    self.relay.activate();
                    self.set_state(SessionState::WaitingForInput);
                }
            }
            ExecutionEvent::InputRequested { waiting: false } => {
                if matches!(self.state, SessionState::Starting | SessionState::WaitingForInput) {
                    self.relay.deactivate();
                    self.set_state(SessionState::Running);
                }
            }
            ExecutionEvent::Terminated { ok, message } => match self.state {
                SessionState::Stopping => self.finish_stop("acknowledged"),
                SessionState::Starting | SessionState::Running | SessionState::WaitingForInput => {
                    if ok {
                        self.complete();
                    } else {
                        self.fail_engine(message);
                    }
                }
                SessionState::Idle | SessionState::Completed | SessionState::Errored => {
                    debug!(target: "coderun::session", "Session {} ignoring late result", self.id);
                }
            },
            ExecutionEvent::ChannelError { reason } => {
                if self.state.is_active() {
                    self.fail_channel(reason);
                }
            }
        }
    }

    /// Release everything held for a run. Used when the surface unmounts.
    pub fn shutdown(&mut self) {
        if self.state.can_stop() {
            if let Err(e) = self.channel.send(self.id, ExecutionCommand::Stop) {
                debug!(target: "coderun::session", "Session {} stop on shutdown not sent: {}", self.id, e);
            }
        }
        self.relay.deactivate();
        self.stop_deadline = None;
        self.channel.release(self.id);
        info!(target: "coderun::session", "Session {} shut down in state {}", self.id, self.state);
    }

    fn append_output(&mut self, text: &str, is_error: bool) {
        if is_error {
            trace!(target: "coderun::session", "Session {} stderr: {:?}", self.id, text);
        }
        self.transcript.append_chunk(TextSource::Remote, text);
        self.publish_transcript(TextSource::Remote);
    }

    fn complete(&mut self) {
        self.end_run();
        info!(target: "coderun::session", "Session {} run completed", self.id);
        self.set_state(SessionState::Completed);
    }

    fn fail_engine(&mut self, message: Option<String>) {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        self.end_run();
        warn!(target: "coderun::session", "Session {} run failed: {}", self.id, message);
        self.transcript.annotate(&format!("{}: {}", GENERIC_FAILURE, message));
        self.publish_transcript(TextSource::Remote);
        self.last_error = Some(message);
        self.failure = Some(FailureKind::EngineReported);
        self.set_state(SessionState::Errored);
    }

    fn fail_channel(&mut self, reason: String) {
        self.end_run();
        warn!(target: "coderun::session", "Session {} lost its channel: {}", self.id, reason);
        self.transcript.annotate(&format!("Connection lost: {}", reason));
        self.publish_transcript(TextSource::Remote);
        self.last_error = Some(reason);
        self.failure = Some(FailureKind::Channel);
        self.set_state(SessionState::Errored);
    }

    fn finish_stop(&mut self, how: &str) {
        self.end_run();
        info!(target: "coderun::session", "Session {} stopped ({})", self.id, how);
        self.set_state(SessionState::Idle);
    }

    fn end_run(&mut self) {
        self.relay.deactivate();
        self.stop_deadline = None;
        self.finished_at = Some(Utc::now());
        self.channel.release(self.id);
    }

    fn set_state(&mut self, new_state: SessionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        debug!(target: "coderun::session", "Session {} {} -> {}", self.id, old_state, new_state);
        let _ = self.event_tx.send(SessionEvent::StateChanged {
            session_id: self.id,
            old_state,
            new_state,
        });
    }

    fn publish_transcript(&self, source: TextSource) {
        let _ = self.event_tx.send(SessionEvent::TranscriptUpdated {
            session_id: self.id,
            transcript: self.transcript.as_str().to_string(),
            source,
        });
    }
}
