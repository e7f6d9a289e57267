//! QUIC server listener

use anyhow::{Context, Result};
use quinn::Endpoint;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{Config, SERVER_KEYLOG_PATH};
use crate::connection::SessionManager;
use crate::protocol::{CLOSE_CODE, CLOSE_REASON};
use crate::tls;
use crate::transport::transport_config;
use crate::util::{create_udp_socket, resolve_addr};

use super::acceptor::SessionHandler;

/// Time allowed for close frames to leave after the endpoint is closed
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Tunnel server: accepts sessions and forwards every stream to one destination
pub struct Server {
    endpoint: Endpoint,
    config: Arc<Config>,
    sessions: Arc<SessionManager>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Create a new server instance and bind its endpoint
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        config.validate()?;

        let identity = tls::resolve_identity(&config.tls)?;
        let key_log = tls::open_key_log(config.keylog.resolve(SERVER_KEYLOG_PATH))?;
        let crypto = tls::server_crypto(identity, key_log)?;

        let mut server_config = tls::quic_server_config(crypto)?;
        server_config.transport_config(Arc::new(transport_config(&config.quic)?));

        let listen = resolve_addr(&config.server.listen).await?;
        let socket = create_udp_socket(listen)?;

        let runtime =
            quinn::default_runtime().ok_or_else(|| anyhow::anyhow!("No async runtime found"))?;

        let endpoint = Endpoint::new(
            quinn::EndpointConfig::default(),
            Some(server_config),
            socket,
            runtime,
        )
        .context("Failed to create QUIC endpoint")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            endpoint,
            config,
            sessions: SessionManager::new(),
            shutdown_rx,
            shutdown_tx,
        })
    }

    /// Address the endpoint is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint
            .local_addr()
            .context("Failed to read endpoint address")
    }

    /// Session registry, for inspection
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run the accept loop until the endpoint closes or shutdown is signaled
    pub async fn run(&self) -> Result<()> {
        info!(
            listen = %self.local_addr()?,
            destination = %self.config.server.destination,
            "Server accepting sessions"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                incoming = self.endpoint.accept() => {
                    match incoming {
                        Some(incoming) => {
                            let handler =
                                SessionHandler::new(self.sessions.clone(), self.config.clone());

                            tokio::spawn(async move {
                                if let Err(e) = handler.handle(incoming).await {
                                    debug!(error = %e, "Session error");
                                }
                            });
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown");

        let _ = self.shutdown_tx.send(true);
        self.sessions.signal_shutdown();
        self.sessions.drain(self.config.server.drain_timeout()).await;

        self.endpoint.close(CLOSE_CODE, CLOSE_REASON);
        let _ = tokio::time::timeout(CLOSE_LINGER, self.endpoint.wait_idle()).await;

        info!("Server shutdown complete");
    }
}
