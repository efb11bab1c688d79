//! Runtime configuration for sessions and the execution channel.

use std::time::Duration;

/// Configuration for an execution session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long `Stopping` waits for the engine to acknowledge before the
    /// session forces itself back to `Idle`.
    pub stop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(3),
        }
    }
}

/// Attempts made when establishing the channel.
///
/// Applies only to opening a connection. A dropped connection is never
/// retried on behalf of an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// A single attempt, no backoff.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

/// Configuration for the connection to the execution engine.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint of the engine (`ws://` or `wss://`).
    pub url: String,
    /// Bearer token identifying the user to the engine.
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000/execution".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
