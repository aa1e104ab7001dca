//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from configuration
//! - Bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::observability::{logging, metrics};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialize logging: {0}")]
    Logging(#[from] logging::TryInitError),

    #[error("invalid address `{address}`")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|source| StartupError::Address {
        address: address.to_string(),
        source,
    })
}

/// Install the tracing subscriber and, when enabled, the Prometheus exporter.
pub fn init_observability(config: &AppConfig) -> Result<(), StartupError> {
    logging::init_logging(&config.observability)?;
    if config.observability.metrics_enabled {
        metrics::init_metrics(parse_addr(&config.observability.metrics_address)?)?;
    }
    Ok(())
}

/// Bind the configured listener address.
pub async fn bind_listener(config: &AppConfig) -> Result<TcpListener, StartupError> {
    let address = parse_addr(&config.listener.bind_address)?;
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}
