//! Admin Gate (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                      ADMIN GATE                      │
//!                     │                                                      │
//!   Client Request    │  ┌───────────┐   ┌───────────┐   ┌──────────────┐    │
//!   ──────────────────┼─▶│ client_ip │──▶│  access   │──▶│  rate_limit  │    │
//!                     │  │ resolver  │   │  policy   │   │   (window)   │    │
//!                     │  └───────────┘   └─────┬─────┘   └──────┬───────┘    │
//!                     │                        │ deny           ▼            │
//!                     │                        ▼          ┌──────────────┐   │
//!                     │                  ┌───────────┐    │     csrf     │   │
//!                     │                  │   audit   │◀───│ (mutating)   │   │
//!                     │                  │ log+alert │    └──────┬───────┘   │
//!                     │                  └───────────┘           ▼           │
//!   Response          │                        ▲          ┌──────────────┐   │
//!   ◀─────────────────┼────────────────────────┴──────────│admin handlers│   │
//!                     │                                   └──────────────┘   │
//!                     └──────────────────────────────────────────────────────┘
//! ```
//!
//! The config file path is the first argument, or `ADMIN_GATE_CONFIG`.
//! Without either, defaults plus environment overrides are used.

use std::path::PathBuf;

use tokio::net::TcpListener;

use admin_gate::config::loader::load_config;
use admin_gate::lifecycle::signals::shutdown_on_signal;
use admin_gate::observability::{logging, metrics};
use admin_gate::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ADMIN_GATE_CONFIG").ok())
        .map(PathBuf::from);

    let config = load_config(config_path.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!("admin-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        allow_list_entries = config.access.allowed_ips.len(),
        development_mode = config.access.development_mode,
        audit_path = %config.audit.path,
        "Configuration loaded"
    );

    if config.admin.password == admin_gate::config::schema::DEFAULT_ADMIN_PASSWORD {
        tracing::warn!("Admin password is the built-in default; set ADMIN_PASSWORD");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let signal = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
