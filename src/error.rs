//! Classified tunnel failures
//!
//! Startup and per-connection paths use `anyhow`; these variants are the
//! cases callers (and tests) need to tell apart.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("handshake with {addr} did not complete within {timeout:?}")]
    HandshakeTimeout { addr: SocketAddr, timeout: Duration },

    #[error("session closed: {0}")]
    SessionClosed(#[from] quinn::ConnectionError),

    #[error("failed to dial destination {destination}: {source}")]
    Dial {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dialing destination {destination} did not complete within {timeout:?}")]
    DialTimeout {
        destination: String,
        timeout: Duration,
    },

    #[error("could not resolve address {0}")]
    Unresolved(String),

    #[error("no certificates found in {0}")]
    MissingCertificate(PathBuf),

    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),
}
