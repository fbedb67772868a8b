//! CRM API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                        GATEWAY                           │
//!                     │                                                          │
//!   Client Request    │  ┌──────────┐   ┌──────────┐   ┌──────────────┐          │
//!   ──────────────────┼─▶│ logging  │──▶│  http    │──▶│   routing    │          │
//!                     │  │middleware│   │ server   │   │ route table  │          │
//!                     │  └──────────┘   └──────────┘   └──────┬───────┘          │
//!                     │                                       │                  │
//!                     │                                       ▼                  │
//!                     │                               ┌──────────────┐           │
//!                     │                               │  resilience  │           │
//!                     │                               │breaker/retry │           │
//!                     │                               └──────┬───────┘           │
//!                     │                                       │                  │
//!                     │                                       ▼                  │
//!   Client Response   │  ┌──────────┐                 ┌──────────────┐           │
//!   ◀─────────────────┼──│ fallback │◀── on failure ──│   upstream   │◀──────────┼── Backend
//!                     │  │ responder│                 │  (discovery) │           │   Service
//!                     │  └──────────┘                 └──────────────┘           │
//!                     │                                                          │
//!                     │  Cross-cutting: config, observability, security,         │
//!                     │  admin, lifecycle                                        │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use crm_gateway::config::load_config;
use crm_gateway::http::HttpServer;
use crm_gateway::lifecycle::{wait_for_signal, Shutdown};
use crm_gateway::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "API gateway for the CRM backend services", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;

    tracing::info!("crm-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
