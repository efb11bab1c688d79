//! Session types and state machine states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution session state in the run lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No run in flight.
    #[default]
    Idle,
    /// Start sent, nothing heard back from the engine yet.
    Starting,
    /// Program is running and producing output.
    Running,
    /// Program is blocked reading stdin.
    WaitingForInput,
    /// Stop requested, acknowledgement pending.
    Stopping,
    /// Engine reported a successful exit.
    Completed,
    /// Engine reported failure or the channel dropped.
    Errored,
}

impl SessionState {
    /// Check if a run is in flight (the session holds the channel).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Starting
                | SessionState::Running
                | SessionState::WaitingForInput
                | SessionState::Stopping
        )
    }

    /// Check if a Stop request is meaningful in this state.
    pub fn can_stop(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::WaitingForInput
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::WaitingForInput => "waiting_for_input",
            SessionState::Stopping => "stopping",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a session, published to observers after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Stable for the editor surface's lifetime.
    pub id: Uuid,
    pub state: SessionState,
    /// User-facing language label (e.g. "C++").
    pub language: String,
    /// Visible output so far, including local echo.
    pub transcript: String,
    /// Interactive input typed but not yet submitted.
    pub input_buffer: String,
    /// Set only while `state == Errored`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Which side ended the run, alongside `last_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// Snapshot of a freshly mounted session.
    pub fn idle(id: Uuid, language: impl Into<String>) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            language: language.into(),
            transcript: String::new(),
            input_buffer: String::new(),
            last_error: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Why a run ended in `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine reported `success: false`.
    EngineReported,
    /// The connection failed or dropped.
    Channel,
}

/// Origin of a piece of transcript text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Program output relayed by the engine.
    Remote,
    /// Keystrokes echoed locally before the engine sees them.
    LocalEcho,
}
