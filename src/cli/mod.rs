//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod prime;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::chat::run_chat;
use crate::cli::prime::run_prime;
use crate::core::config::data::path_display;
use crate::core::config::Config;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "confab")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "A line-oriented client for a real-time conversation service")]
#[command(
    long_about = "Confab keeps a persistent WebSocket connection to a conversation service, \
reconnecting with backoff when the link drops. Lines typed on stdin are sent as messages; \
replies and delivery status are printed to stdout as they arrive.\n\n\
Configuration:\n\
  Settings are read from config.toml in the platform config directory, or from --config.\n\
  Use 'confab config init' to write a file with every default spelled out.\n\n\
Logging:\n\
  RUST_LOG          Log filter (default: confab=info); logs go to stderr"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint of the conversation service (overrides the config file)
    #[arg(short = 'e', long, global = true, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Consecutive failed connect attempts before giving up (overrides the config file)
    #[arg(long, global = true, value_name = "N")]
    pub max_reconnect_attempts: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat over stdin/stdout (default)
    Chat {
        /// JSON context sent to the bootstrap endpoint while connecting
        #[arg(long, value_name = "JSON")]
        context: Option<String>,
    },
    /// Send only the bootstrap request and print the acknowledgement
    Prime {
        /// JSON context to send
        #[arg(long, value_name = "JSON")]
        context: String,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file containing every default
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log_json);
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "confab=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be installed when embedded; keep that one.
    let _ = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::get_config_path()?,
    };

    match args.command {
        Some(Commands::Config {
            command: ConfigCommands::Init { force },
        }) => {
            let mut config = Config::with_defaults();
            config.apply_overrides(args.endpoint, args.max_reconnect_attempts);
            init_config(&config, &config_path, force)
        }
        Some(Commands::Config {
            command: ConfigCommands::Show,
        }) => {
            let config = load_config(&config_path, args.endpoint, args.max_reconnect_attempts)?;
            println!("Config file: {}", path_display(&config_path));
            config.print_all();
            Ok(())
        }
        Some(Commands::Prime { context }) => {
            let config = load_config(&config_path, args.endpoint, args.max_reconnect_attempts)?;
            run_prime(config.session_config()?, parse_context(&context)?).await
        }
        Some(Commands::Chat { context }) => {
            let config = load_config(&config_path, args.endpoint, args.max_reconnect_attempts)?;
            let context = context.as_deref().map(parse_context).transpose()?;
            run_chat(config.session_config()?, context).await
        }
        None => {
            let config = load_config(&config_path, args.endpoint, args.max_reconnect_attempts)?;
            run_chat(config.session_config()?, None).await
        }
    }
}

fn load_config(
    path: &Path,
    endpoint: Option<String>,
    max_reconnect_attempts: Option<u32>,
) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load_from_path(path)?;
    config.apply_overrides(endpoint, max_reconnect_attempts);
    Ok(config)
}

fn init_config(config: &Config, path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    if path.exists() && !force {
        return Err(format!(
            "A config file already exists at {}; pass --force to overwrite it",
            path_display(path)
        )
        .into());
    }
    // Reject values a session could not run with before writing them out.
    config.session_config()?;
    config.save_to_path(path)?;
    println!("✅ Wrote default configuration to {}", path_display(path));
    Ok(())
}

fn parse_context(raw: &str) -> Result<Value, Box<dyn Error>> {
    serde_json::from_str(raw).map_err(|err| format!("--context is not valid JSON: {err}").into())
}

#[cfg(test)]
mod tests;
