//! QuicTun Client - Entry Point
//!
//! Listens for local TCP connections and forwards them over one QUIC session.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use quictun_client::{Config, TunnelClient, VERSION};

#[derive(Debug, Parser)]
#[command(name = "quictun-client", version = VERSION, about = "TCP-over-QUIC tunnel client")]
struct Args {
    /// Tunnel server address (host:port)
    remote: String,

    /// Local TCP address to listen on [default: 127.0.0.1:8080]
    #[arg(short, long)]
    listen: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verify the server certificate against web roots or --ca
    #[arg(long)]
    verify: bool,

    /// PEM roots to verify the server against
    #[arg(long, requires = "verify")]
    ca: Option<PathBuf>,

    /// TLS server name (defaults to the host part of REMOTE)
    #[arg(long)]
    server_name: Option<String>,

    /// Do not write TLS secrets to the key log
    #[arg(long)]
    no_keylog: bool,
}

impl Args {
    /// Layer command-line values over the file configuration
    fn into_config(self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())
            .with_context(|| format!("Failed to load config from {:?}", self.config))?;

        config.client.remote = self.remote;
        if let Some(listen) = self.listen {
            config.client.listen = listen;
        }
        if self.verify {
            config.client.verify = true;
        }
        if self.ca.is_some() {
            config.client.ca_path = self.ca;
        }
        if self.server_name.is_some() {
            config.client.server_name = self.server_name;
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

    info!(version = VERSION, remote = %config.client.remote, "Starting QuicTun Client");

    if config.metrics.enabled {
        quictun::metrics::init_metrics(&config.metrics)?;
        info!(bind_addr = %config.metrics.bind_addr, "Metrics endpoint started");
    }

    let client = match TunnelClient::new(Arc::new(config)).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to start client");
            return Err(e);
        }
    };

    tokio::select! {
        result = client.run() => {
            if let Err(e) = result {
                error!(error = %e, "Client error");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            client.shutdown().await;
        }
    }

    info!("Client stopped");
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
