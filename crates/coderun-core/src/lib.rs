//! Client side of interactive remote code execution for Coderun.

mod channel;
mod config;
mod error;
mod input;
mod language;
mod runner;
mod session;
mod transcript;
mod ws;

pub use channel::{ChannelAdapter, CommandChannel, Connection, ConnectionStatus, Connector};
pub use config::{ChannelConfig, ReconnectPolicy, SessionConfig};
pub use error::CoderunError;
pub use input::{InputRelay, Key, RelayAction};
pub use language::{starter_template, LanguageResolver, ResolvedLanguage};
pub use runner::{SessionHandle, SessionRunner};
pub use session::{ExecutionSession, SessionEvent};
pub use transcript::{TranscriptReconstructor, BACKSPACE};
pub use ws::WebSocketConnector;

/// Result type for Coderun operations.
pub type Result<T> = std::result::Result<T, CoderunError>;
