//! Tracing setup for the CLI.
//!
//! A preset picks the base directives, `--log target=level` pairs refine
//! them, and `RUST_LOG` replaces both when set. Logs always go to stderr;
//! stdout carries the program transcript.

use clap::ValueEnum;
use std::collections::BTreeMap;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Warnings, plus startup and connection events
    #[default]
    Production,
    /// Session lifecycle and connection detail
    Verbose,
    Debug,
    /// Every chunk and keystroke
    Trace,
    /// Errors only
    Quiet,
}

impl LogPreset {
    fn directives(self) -> &'static [&'static str] {
        match self {
            LogPreset::Production => &[
                "coderun=warn",
                "coderun::startup=info",
                "coderun::channel=info",
                "tungstenite=error",
            ],
            LogPreset::Verbose => &["coderun=info", "coderun::transcript=off", "tungstenite=warn"],
            LogPreset::Debug => &["coderun=debug", "coderun::transcript=info", "tungstenite=info"],
            LogPreset::Trace => &["coderun=trace", "tungstenite=debug"],
            LogPreset::Quiet => &["coderun=error", "tungstenite=off"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Full target name to level, e.g. "coderun::channel" -> DEBUG.
    pub overrides: BTreeMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    /// The quietest flag wins when several are given.
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = [
            (quiet, LogPreset::Quiet),
            (trace, LogPreset::Trace),
            (debug, LogPreset::Debug),
            (verbose, LogPreset::Verbose),
        ]
        .into_iter()
        .find_map(|(set, preset)| set.then_some(preset))
        .unwrap_or_default();

        let overrides = log_overrides
            .iter()
            .flat_map(|arg| arg.split(','))
            .filter_map(parse_override)
            .collect();

        Self {
            preset,
            overrides,
            format,
        }
    }

    pub fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directives()))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }

    fn directives(&self) -> String {
        self.preset
            .directives()
            .iter()
            .map(|d| d.to_string())
            .chain(
                self.overrides
                    .iter()
                    .map(|(target, level)| format!("{}={}", target, level.to_string().to_lowercase())),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse one `target=level` pair. Bare targets live under `coderun::`.
fn parse_override(pair: &str) -> Option<(String, Level)> {
    let (target, level) = pair.split_once('=')?;
    let target = target.trim();
    let level: Level = level.trim().parse().ok()?;

    let qualified = target == "coderun" || target.starts_with("coderun::") || target.contains("tungstenite");
    let target = if qualified {
        target.to_string()
    } else {
        format!("coderun::{}", target)
    };
    Some((target, level))
}

pub fn init(config: &LogConfig) {
    let registry = tracing_subscriber::registry().with(config.build_filter());
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match config.format {
        LogFormat::Text => registry.with(layer).init(),
        LogFormat::Json => registry.with(layer.json()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_overrides(quiet: bool, overrides: &[&str]) -> LogConfig {
        LogConfig::from_cli(
            false,
            false,
            false,
            quiet,
            overrides.iter().map(|s| s.to_string()).collect(),
            LogFormat::Text,
        )
    }

    #[test]
    fn test_log_format_values() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("TEXT", true), Ok(LogFormat::Text));
        assert!(LogFormat::from_str("yaml", true).is_err());
    }

    #[test]
    fn test_quietest_flag_wins() {
        let preset = |v, d, t, q| LogConfig::from_cli(v, d, t, q, vec![], LogFormat::Text).preset;
        assert_eq!(preset(true, true, true, true), LogPreset::Quiet);
        assert_eq!(preset(true, true, true, false), LogPreset::Trace);
        assert_eq!(preset(true, true, false, false), LogPreset::Debug);
        assert_eq!(preset(true, false, false, false), LogPreset::Verbose);
        assert_eq!(preset(false, false, false, false), LogPreset::Production);
    }

    #[test]
    fn test_bare_targets_are_qualified() {
        let config = with_overrides(false, &["channel=debug", "input=trace,session=info"]);
        assert_eq!(config.overrides.get("coderun::channel"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("coderun::input"), Some(&Level::TRACE));
        assert_eq!(config.overrides.get("coderun::session"), Some(&Level::INFO));
    }

    #[test]
    fn test_qualified_targets_pass_through() {
        let config = with_overrides(false, &["coderun::ws=debug", "tungstenite=trace", "bogus=loud", "noequals"]);
        assert_eq!(config.overrides.get("coderun::ws"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("tungstenite"), Some(&Level::TRACE));
        assert_eq!(config.overrides.len(), 2);
    }

    #[test]
    fn test_overrides_come_after_preset() {
        let directives = with_overrides(true, &["session=debug"]).directives();
        assert_eq!(directives, "coderun=error,tungstenite=off,coderun::session=debug");
    }
}
