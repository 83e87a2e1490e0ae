//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod tools;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;
use crate::utils::url::call_address;

fn long_version() -> &'static str {
    static LONG_VERSION: std::sync::LazyLock<String> = std::sync::LazyLock::new(|| {
        format!(
            "{} (git {}, built {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown"),
            option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        )
    });
    &LONG_VERSION
}

#[derive(Parser)]
#[command(name = "mcp-broker")]
#[command(version, long_version = long_version())]
#[command(about = "Discover the tools behind an MCP access point")]
#[command(
    long_about = "mcp-broker opens a WebSocket connection to an MCP access point, runs the \
initialize/initialized/tools-list handshake, and prints the tool names the endpoint \
advertises — one per line.\n\n\
Addresses:\n\
  Pass the address the console publishes (the /mcp/ form) or the call address \
directly; /mcp/ paths are rewritten to /call/ and http(s) schemes become ws(s).\n\n\
Configuration:\n\
  A config.toml in the platform config directory provides the default endpoint, \
extra headers and timeout overrides. Manage it with `mcp-broker set` / `unset`.\n\n\
Logging:\n\
  Set RUST_LOG (e.g. RUST_LOG=mcp_broker=debug) to watch the handshake on stderr."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Negotiate the MCP handshake and print the advertised tool names (default)
    Tools {
        /// Access-point or call address; falls back to the configured endpoint
        address: Option<String>,
        /// Extra handshake header, repeatable
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Listening budget for this run, in seconds
        #[arg(long, value_name = "SECONDS")]
        budget: Option<u64>,
    },
    /// Print the call address resolved from an access-point address
    Address {
        /// Access-point address; falls back to the configured endpoint
        address: Option<String>,
    },
    /// Set a configuration value (endpoint, connect-timeout, session-budget)
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        value: String,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Tools {
        address: None,
        headers: Vec::new(),
        budget: None,
    }) {
        Commands::Tools {
            address,
            headers,
            budget,
        } => tools::run_tools(address, headers, budget).await,
        Commands::Address { address } => {
            let config = Config::load()?;
            let address = resolve_address(address, &config)?;
            println!("{}", call_address(&address));
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            apply_set(&mut config, &key, &value)?;
            config.save_to_path(&Config::get_config_path())?;
            println!("Set {key}.");
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            apply_unset(&mut config, &key)?;
            config.save_to_path(&Config::get_config_path())?;
            println!("Unset {key}.");
            Ok(())
        }
    }
}

pub(crate) fn resolve_address(
    address: Option<String>,
    config: &Config,
) -> Result<String, Box<dyn Error>> {
    address.or_else(|| config.endpoint.clone()).ok_or_else(|| {
        "No access-point address given. Pass one as an argument or run \
         `mcp-broker set endpoint <address>`."
            .into()
    })
}

fn parse_seconds(key: &str, value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("{key} must be a number of seconds, got '{value}'"))
}

pub(crate) fn apply_set(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    match key {
        "endpoint" => config.endpoint = Some(value.to_string()),
        "connect-timeout" => {
            config.connect_timeout_secs = Some(parse_seconds(key, value)?);
        }
        "session-budget" => {
            config.session_budget_secs = Some(parse_seconds(key, value)?);
        }
        other => return Err(format!("Unknown configuration key: {other}")),
    }
    Ok(())
}

pub(crate) fn apply_unset(config: &mut Config, key: &str) -> Result<(), String> {
    match key {
        "endpoint" => config.endpoint = None,
        "connect-timeout" => config.connect_timeout_secs = None,
        "session-budget" => config.session_budget_secs = None,
        other => return Err(format!("Unknown configuration key: {other}")),
    }
    Ok(())
}
