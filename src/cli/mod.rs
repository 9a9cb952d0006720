//! Command-line interface parsing and process startup.
//!
//! `oneagent-mcp` serves line-delimited JSON-RPC over stdio by default. The
//! `serve` subcommand exposes the same tools to multiple clients over SSE.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{Config, ConfigStore, EnvOverrides};
use crate::core::pdf::PopplerInspector;
use crate::core::remote::graphql::GraphqlClient;
use crate::mcp::server::McpHandler;
use crate::mcp::transport::sessions::SessionManager;
use crate::mcp::transport::{sse, stdio};
use crate::tools::ToolContext;

pub const DEFAULT_BIND: &str = "127.0.0.1:8123";

/// Environment variable consulted for the log filter when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "ONEAGENT_LOG";

#[derive(Parser, Debug)]
#[command(name = "oneagent-mcp")]
#[command(version, about = "MCP server for OneAgent organization branding, uploads and documents")]
#[command(
    long_about = "oneagent-mcp exposes OneAgent operations as MCP tools: organization theme and \
logo management, file uploads, PDF inspection, and server configuration.\n\n\
Configuration:\n\
  Use the config_set tool to store the API key, organization id and user id.\n\
  The environment can seed them on first load:\n\
  API_KEY, ORGANIZATION_ID, USER_ID, TIMEOUT, RETRIES\n\n\
Logging:\n\
  Logs go to stderr. RUST_LOG or ONEAGENT_LOG set the filter; -v raises verbosity."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Serve a single client over stdin/stdout (default)
    Stdio,
    /// Serve clients over HTTP server-sent events
    Serve {
        /// Address to listen on
        #[arg(long, value_name = "ADDR", default_value = DEFAULT_BIND)]
        bind: SocketAddr,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);
    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    info!(path = %config_path.display(), "Using configuration file");

    let config = Arc::new(ConfigStore::new(
        config_path,
        EnvOverrides::from_process_env(),
    ));
    let ctx = ToolContext::new(
        config.clone(),
        Arc::new(GraphqlClient::new(config)),
        Arc::new(PopplerInspector),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match args.command.unwrap_or(Commands::Stdio) {
        Commands::Stdio => {
            let handler = McpHandler::for_context(ctx, clock);
            stdio::run(&handler).await?;
        }
        Commands::Serve { bind } => {
            let listener = TcpListener::bind(bind).await?;
            let manager = Arc::new(SessionManager::new(ctx, clock));
            let shutdown = CancellationToken::new();

            let trigger = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Interrupt received, shutting down"),
                    Err(err) => warn!(error = %err, "Cannot listen for Ctrl-C"),
                }
                trigger.cancel();
            });

            sse::serve(listener, manager, shutdown).await?;
        }
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let directive = filter_directive(
        std::env::var("RUST_LOG").ok(),
        std::env::var(LOG_ENV).ok(),
        verbose,
    );
    let filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the log filter: `RUST_LOG`, then `ONEAGENT_LOG`, then `-v` count.
pub fn filter_directive(rust_log: Option<String>, app_log: Option<String>, verbose: u8) -> String {
    if let Some(value) = rust_log.filter(|value| !value.trim().is_empty()) {
        return value;
    }
    if let Some(value) = app_log.filter(|value| !value.trim().is_empty()) {
        return match value.trim() {
            "silent" => "off".to_string(),
            "fatal" => "error".to_string(),
            other => other.to_string(),
        };
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
    .to_string()
}
