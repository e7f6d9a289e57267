//! Local TCP listener
//!
//! Every accepted connection becomes one bidirectional stream on the shared
//! session. The accept loop never waits for a forwarded connection to end.

use anyhow::{Context, Result};
use quinn::{Connection, ConnectionError, Endpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use quictun::bridge::{reset_tcp, Bridge};
use quictun::error::TunnelError;
use quictun::metrics::METRICS;
use quictun::protocol::{CLOSE_CODE, CLOSE_REASON};

use super::connection::connect;
use super::keepalive::KeepaliveTask;
use crate::config::Config;

/// Tunnel client: one session, one listener, many bridges
pub struct TunnelClient {
    config: Arc<Config>,
    endpoint: Endpoint,
    connection: Connection,
    listener: TcpListener,
    keepalive: KeepaliveTask,
    shutdown_tx: broadcast::Sender<()>,
}

impl TunnelClient {
    /// Establish the session, start the keepalive and bind the listener
    pub async fn new(config: Arc<Config>) -> Result<Self> {
        config.validate()?;

        let (endpoint, connection) = connect(&config).await?;
        let keepalive =
            KeepaliveTask::spawn(connection.clone(), config.client.keepalive_interval());

        let listener = TcpListener::bind(&config.client.listen)
            .await
            .with_context(|| format!("Failed to bind listener on {}", config.client.listen))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            endpoint,
            connection,
            listener,
            keepalive,
            shutdown_tx,
        })
    }

    /// Address the TCP listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accept and forward until shutdown; a lost session is an error
    pub async fn run(&self) -> Result<()> {
        info!(
            listen = %self.local_addr()?,
            remote = %self.config.client.remote,
            "Client accepting connections"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((socket, peer)) => {
                            tokio::spawn(forward(self.connection.clone(), socket, peer));
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept failed");
                        }
                    }
                }
                reason = self.connection.closed() => {
                    if matches!(reason, ConnectionError::LocallyClosed) {
                        debug!("Listener shutting down");
                        return Ok(());
                    }
                    error!(reason = %reason, "Session closed");
                    return Err(TunnelError::SessionClosed(reason).into());
                }
                _ = shutdown_rx.recv() => {
                    debug!("Listener shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Close the session with the orderly close code
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.keepalive.stop();

        self.connection.close(CLOSE_CODE, CLOSE_REASON);
        self.endpoint.wait_idle().await;

        info!("Client shutdown complete");
    }
}

/// Forward one accepted connection over a new stream
#[instrument(name = "forward", skip(connection, socket))]
async fn forward(connection: Connection, socket: TcpStream, peer: SocketAddr) {
    let _ = socket.set_nodelay(true);

    // Waits here while the session is at its stream limit
    let (send, recv) = match connection.open_bi().await {
        Ok(stream) => stream,
        Err(e) => {
            METRICS.open_failed();
            warn!(error = %e, "Failed to open stream, resetting connection");
            let _ = reset_tcp(&socket);
            return;
        }
    };

    debug!(stream = %send.id(), "Forwarding connection");
    Bridge::new(socket, send, recv).run().await;
}
