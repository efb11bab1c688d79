//! Client configuration.

use anyhow::{Context, Result};
use coderun_core::{ChannelConfig, ReconnectPolicy, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the bearer token.
pub const TOKEN_ENV: &str = "CODERUN_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_url() -> String {
    "ws://localhost:5000/execution".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_stop_timeout_ms() -> u64 {
    3_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `config/default.toml`, then the user config dir, else defaults.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config/default.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("coderun").join("config.toml"));
        }
        paths
    }

    /// Apply `--url` and the token from the environment.
    pub fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url {
            self.url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = Some(token);
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.url.clone(),
            token: self.token.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                base_delay: Duration::from_millis(self.reconnect_delay_ms),
            },
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}
