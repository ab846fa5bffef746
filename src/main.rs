//! Streamable-HTTP Session Gateway
//!
//! Exposes a JSON-RPC message channel over a single HTTP path and keeps a
//! long-lived session per client.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────┐
//!                        │                SESSION GATEWAY                │
//!                        │                                               │
//!   POST / GET / DELETE  │  ┌─────────┐   ┌──────────┐   ┌───────────┐   │
//!   ─────────────────────┼─▶│  http   │──▶│   auth   │──▶│  session  │   │
//!                        │  │endpoint │   │   gate   │   │ registry  │   │
//!                        │  └─────────┘   └──────────┘   └─────┬─────┘   │
//!                        │                                     │         │
//!                        │                                     ▼         │
//!   JSON / 202 / SSE     │                               ┌───────────┐   │
//!   ◀────────────────────┼───────────────────────────────│ transport │   │
//!                        │                               │  channel  │   │
//!                        │                               └───────────┘   │
//!                        │  config · lifecycle · observability           │
//!                        └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use session_gateway::config::{read_config, validate_config, GatewayConfig, SessionMode};
use session_gateway::lifecycle::shutdown_signal;
use session_gateway::observability::{logging, metrics};
use session_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "session-gateway")]
#[command(about = "Streamable-HTTP session gateway", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address
    #[arg(short, long)]
    bind: Option<String>,

    /// Run without sessions
    #[arg(long)]
    stateless: bool,

    /// Require a bearer token for privileged calls
    #[arg(long)]
    require_api_auth: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if args.stateless {
        config.session.mode = SessionMode::Stateless;
    }
    if args.require_api_auth {
        config.auth.require_api_auth = true;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-gateway starting");

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    if config.observability.metrics_enabled {
        // Validation already checked that the address parses.
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let handle = GatewayServer::with_defaults(config).spawn(listener)?;

    shutdown_signal().await;

    let report = handle.drain_and_stop().await;
    tracing::info!(
        closed = report.closed,
        failed = report.failed,
        forced = report.forced,
        "Shutdown complete"
    );
    Ok(())
}
