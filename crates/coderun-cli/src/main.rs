//! Coderun - run programs on a remote execution engine from the terminal.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coderun_cli::{config, logging, terminal};
use coderun_core::{starter_template, ChannelAdapter, LanguageResolver, SessionRunner};
use std::path::{Path, PathBuf};

use config::Config;
use logging::{LogConfig, LogFormat};

/// Coderun - interactive remote code execution.
#[derive(Parser, Debug)]
#[command(name = "coderun")]
#[command(about = "Run programs on a remote execution engine with live, interactive I/O")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the engine URL from config
    #[arg(long, value_name = "URL", global = true)]
    url: Option<String>,

    /// Enable verbose logging (session lifecycle)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace logging (every chunk and keystroke)
    #[arg(long, global = true)]
    trace: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "channel=debug").
    /// Can be specified multiple times. Targets are prefixed with "coderun::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL", global = true)]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program interactively
    Run {
        /// Source file to run
        file: PathBuf,

        /// Language label or engine id (inferred from the extension if omitted)
        #[arg(short, long)]
        language: Option<String>,

        /// Text written to the program's stdin before it starts
        #[arg(short, long)]
        input: Option<String>,
    },
    /// List supported languages
    Languages,
    /// Print the starter program for a language
    Template {
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    match cli.command {
        Command::Languages => {
            let resolver = LanguageResolver::builtin();
            for label in resolver.supported_languages() {
                let resolved = resolver.resolve(label)?;
                println!("{:<12} {}", label, resolved.engine_id);
            }
            Ok(())
        }
        Command::Template { language } => {
            let label = canonical_language(&language)?;
            print!("{}", starter_template(label)?);
            Ok(())
        }
        Command::Run {
            file,
            language,
            input,
        } => {
            let mut config = match &cli.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            config.apply_overrides(cli.url, std::env::var(config::TOKEN_ENV).ok());
            tracing::info!(target: "coderun::startup", "Using engine at {}", config.url);

            let label = match language {
                Some(language) => canonical_language(&language)?,
                None => infer_language(&file)?,
            };
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;

            let adapter = ChannelAdapter::websocket(&config.channel_config());
            let handle = SessionRunner::spawn(adapter.clone(), label, config.session_config());

            let status = match terminal::run_interactive(&handle, code, label, input).await {
                Ok(status) => status,
                Err(e) => {
                    eprintln!("coderun: {:#}", e);
                    1
                }
            };

            adapter.disconnect();
            std::process::exit(status);
        }
    }
}

fn canonical_language(input: &str) -> Result<&'static str> {
    let resolver = LanguageResolver::builtin();
    match resolver.canonical_label(input) {
        Some(label) => Ok(label),
        None => bail!(
            "unknown language '{}' (supported: {})",
            input,
            resolver.supported_languages().join(", ")
        ),
    }
}

fn infer_language(path: &Path) -> Result<&'static str> {
    match terminal::language_for_path(path) {
        Some(label) => Ok(label),
        None => bail!(
            "cannot infer language from {}; pass --language",
            path.display()
        ),
    }
}
