//! Error types for Coderun.

use coderun_types::FailureKind;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CoderunError {
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Session busy: run already active on session {0}")]
    SessionBusy(Uuid),

    #[error("No source code to run")]
    EmptySource,

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Execution failed: {0}")]
    EngineReportedFailure(String),

    #[error("Session closed: {0}")]
    SessionClosed(Uuid),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
}

impl CoderunError {
    /// Rebuild the error that ended a run from its recorded kind and message.
    pub fn from_failure(kind: FailureKind, message: String) -> Self {
        match kind {
            FailureKind::EngineReported => CoderunError::EngineReportedFailure(message),
            FailureKind::Channel => CoderunError::ChannelError(message),
        }
    }
}
