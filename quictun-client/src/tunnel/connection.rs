//! QUIC session establishment
//!
//! The client dials exactly one session; failing to establish it within
//! the connect timeout is fatal.

use anyhow::{Context, Result};
use quinn::{Connection, Endpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use quictun::error::TunnelError;
use quictun::tls::{self, ClientTrust};
use quictun::transport::transport_config;
use quictun::util::{resolve_addr, unspecified_for};

use crate::config::{Config, CLIENT_KEYLOG_PATH};

/// Resolve the server and dial a single session
pub async fn connect(config: &Config) -> Result<(Endpoint, Connection)> {
    let remote = resolve_addr(&config.client.remote).await?;
    let endpoint = create_client_endpoint(config, remote)?;
    let connection = dial(&endpoint, config, remote).await?;
    Ok((endpoint, connection))
}

/// Create a client endpoint with the tunnel's TLS and transport settings
pub fn create_client_endpoint(config: &Config, remote: SocketAddr) -> Result<Endpoint> {
    let key_log = tls::open_key_log(config.keylog.resolve(CLIENT_KEYLOG_PATH))?;
    let crypto = tls::client_crypto(client_trust(config)?, key_log)?;

    let mut client_config = tls::quic_client_config(crypto)?;
    client_config.transport_config(Arc::new(transport_config(&config.quic)?));

    let mut endpoint = Endpoint::client(unspecified_for(remote))
        .context("Failed to bind client endpoint")?;
    endpoint.set_default_client_config(client_config);

    Ok(endpoint)
}

/// Dial the server, bounded by the connect timeout
pub async fn dial(endpoint: &Endpoint, config: &Config, remote: SocketAddr) -> Result<Connection> {
    let server_name = config.client.get_server_name();
    let timeout = config.client.connect_timeout();

    debug!(addr = %remote, name = %server_name, "Connecting to server");

    let connecting = endpoint
        .connect(remote, server_name)
        .context("Failed to start handshake")?;

    let connection = match tokio::time::timeout(timeout, connecting).await {
        Ok(result) => result.context("Failed to establish QUIC session")?,
        Err(_) => {
            return Err(TunnelError::HandshakeTimeout {
                addr: remote,
                timeout,
            }
            .into())
        }
    };

    info!(addr = %connection.remote_address(), "Connected to server");
    Ok(connection)
}

fn client_trust(config: &Config) -> Result<ClientTrust> {
    if !config.client.verify {
        return Ok(ClientTrust::Insecure);
    }
    match &config.client.ca_path {
        Some(path) => Ok(ClientTrust::Roots(tls::load_certs(path)?)),
        None => Ok(ClientTrust::WebPki),
    }
}
