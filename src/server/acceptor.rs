//! Session and stream handlers
//!
//! One task per inbound session, one task per accepted stream.

use anyhow::{Context, Result};
use quinn::{Connection, ConnectionError, Incoming, RecvStream, SendStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace, warn};

use crate::bridge::{abort_stream, Bridge};
use crate::config::Config;
use crate::connection::{SessionId, SessionManager};
use crate::error::TunnelError;
use crate::metrics::METRICS;
use crate::protocol::{CLOSE_CODE, CLOSE_REASON, KEEPALIVE_PAYLOAD};
use crate::util::dial_tcp;

/// Serves a single QUIC session from handshake to close
pub struct SessionHandler {
    sessions: Arc<SessionManager>,
    config: Arc<Config>,
}

impl SessionHandler {
    pub fn new(sessions: Arc<SessionManager>, config: Arc<Config>) -> Self {
        Self { sessions, config }
    }

    /// Handle an incoming session attempt
    #[instrument(name = "session", skip_all, fields(remote_addr = %incoming.remote_address()))]
    pub async fn handle(self, incoming: Incoming) -> Result<()> {
        // Subscribe before the handshake so a shutdown during it is not missed
        let mut shutdown_rx = self.sessions.subscribe_shutdown();
        let id = self.sessions.register(incoming.remote_address());

        let result = match self.handshake(incoming).await {
            Ok(connection) => {
                self.sessions.activate(id);
                self.serve(id, connection, &mut shutdown_rx).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.sessions.unregister(id);
        result
    }

    async fn handshake(&self, incoming: Incoming) -> Result<Connection> {
        let addr = incoming.remote_address();
        let timeout = self.config.server.handshake_timeout();

        let connecting = incoming.accept().context("Failed to accept session")?;
        match tokio::time::timeout(timeout, connecting).await {
            Ok(result) => result.context("Handshake failed"),
            Err(_) => Err(TunnelError::HandshakeTimeout { addr, timeout }.into()),
        }
    }

    /// Accept streams and drain datagrams until the session ends
    async fn serve(
        &self,
        id: SessionId,
        connection: Connection,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                stream = connection.accept_bi() => {
                    match stream {
                        Ok((send, recv)) => {
                            self.sessions.stream_opened(id);
                            let handler = StreamHandler {
                                destination: self.config.server.destination.clone(),
                                dial_timeout: self.config.server.dial_timeout(),
                            };
                            let sessions = self.sessions.clone();
                            tokio::spawn(async move {
                                handler.handle(send, recv).await;
                                sessions.stream_closed(id);
                            });
                        }
                        Err(e) => {
                            log_session_end(id, &e);
                            break;
                        }
                    }
                }

                datagram = connection.read_datagram() => {
                    match datagram {
                        Ok(data) if data.as_ref() == KEEPALIVE_PAYLOAD => {
                            trace!(session = %id, "Keepalive received");
                            self.sessions.keepalive_received(id);
                        }
                        Ok(data) => {
                            debug!(session = %id, len = data.len(), "Ignoring unexpected datagram");
                        }
                        Err(e) => {
                            log_session_end(id, &e);
                            break;
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!(session = %id, "Shutdown signal received, closing session");
                    connection.close(CLOSE_CODE, CLOSE_REASON);
                    break;
                }
            }
        }
    }
}

fn log_session_end(id: SessionId, error: &ConnectionError) {
    match error {
        ConnectionError::ApplicationClosed(close) => {
            debug!(session = %id, code = %close.error_code, "Session closed by peer");
        }
        ConnectionError::TimedOut => {
            debug!(session = %id, "Session idle timeout");
        }
        ConnectionError::LocallyClosed => {
            debug!(session = %id, "Session closed locally");
        }
        e => {
            warn!(session = %id, error = %e, "Session lost");
        }
    }
}

/// Forwards one accepted stream to the fixed destination
struct StreamHandler {
    destination: String,
    dial_timeout: Duration,
}

impl StreamHandler {
    #[instrument(name = "stream", skip_all, fields(id = %send.id()))]
    async fn handle(self, mut send: SendStream, mut recv: RecvStream) {
        let socket = match dial_tcp(&self.destination, self.dial_timeout).await {
            Ok(socket) => socket,
            Err(e) => {
                METRICS.dial_failed();
                warn!(error = %e, "Aborting stream");
                abort_stream(&mut send, &mut recv);
                return;
            }
        };

        debug!(destination = %self.destination, "Forwarding stream");
        Bridge::new(socket, send, recv).run().await;
    }
}
