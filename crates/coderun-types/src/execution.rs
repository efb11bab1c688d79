//! Typed commands and events exchanged with the execution engine.
//!
//! These are the decoded forms. The JSON frames that actually cross the
//! channel live in [`crate::ClientFrame`] and [`crate::EngineFrame`].

use serde::{Deserialize, Serialize};

/// Outbound command from a session to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionCommand {
    /// Begin running `code` under the given engine.
    Start {
        code: String,
        language_engine_id: String,
        /// Written to stdin up front (single-shot input path).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_input: Option<String>,
    },
    /// Deliver one line of interactive input.
    SubmitInput { text: String },
    /// Ask the engine to terminate the active run.
    Stop,
}

impl ExecutionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionCommand::Start { .. } => "start",
            ExecutionCommand::SubmitInput { .. } => "submit_input",
            ExecutionCommand::Stop => "stop",
        }
    }
}

/// Inbound event from the engine (or the channel itself).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// A fragment of stdout or stderr.
    OutputChunk { text: String, is_error: bool },
    /// Engine is blocked on stdin (`true`) or has resumed (`false`).
    InputRequested { waiting: bool },
    /// Terminal status of the run. Also acknowledges a Stop.
    Terminated {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Connection-level failure: unreachable, dropped, or closed.
    ChannelError { reason: String },
}

impl ExecutionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::OutputChunk { .. } => "output_chunk",
            ExecutionEvent::InputRequested { .. } => "input_requested",
            ExecutionEvent::Terminated { .. } => "terminated",
            ExecutionEvent::ChannelError { .. } => "channel_error",
        }
    }

    pub fn channel_error(reason: impl Into<String>) -> Self {
        ExecutionEvent::ChannelError {
            reason: reason.into(),
        }
    }
}
