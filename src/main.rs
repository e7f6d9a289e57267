//! QuicTun Server - Entry Point
//!
//! Accepts QUIC sessions and forwards every stream to one TCP destination.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use quictun::{Config, Server, VERSION};

#[derive(Debug, Parser)]
#[command(name = "quictun-server", version, about = "TCP-over-QUIC tunnel server")]
struct Args {
    /// Forwarding destination (host:port)
    destination: String,

    /// PEM certificate chain; a self-signed identity is generated when omitted
    #[arg(requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key matching the certificate
    #[arg(requires = "cert")]
    key: Option<PathBuf>,

    /// Local UDP address to listen on [default: 127.0.0.1:8443]
    #[arg(short, long)]
    listen: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not write TLS secrets to the key log
    #[arg(long)]
    no_keylog: bool,
}

impl Args {
    /// Layer command-line values over the file configuration
    fn into_config(self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())
            .with_context(|| format!("Failed to load config from {:?}", self.config))?;

        config.server.destination = self.destination;
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if self.cert.is_some() {
            config.tls.cert_path = self.cert;
            config.tls.key_path = self.key;
        }
        if self.no_keylog {
            config.keylog.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    quictun::util::init_tracing(&config.logging)?;

    info!(version = VERSION, "Starting QuicTun Server");

    if config.metrics.enabled {
        quictun::metrics::init_metrics(&config.metrics)?;
        info!(bind_addr = %config.metrics.bind_addr, "Metrics endpoint started");
    }

    let config = Arc::new(config);
    let server = match Server::new(config.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to start server");
            return Err(e);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, draining sessions...");
            server.shutdown().await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
