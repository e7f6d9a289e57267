//! TLS setup for both tunnel roles
//!
//! Builds the rustls configurations (TLS 1.3 only, ring provider, `h3`
//! ALPN) and wraps them in quinn crypto configs.

pub mod identity;
pub mod keylog;
mod verifier;

use anyhow::{Context, Result};
use rustls::pki_types::CertificateDer;
use rustls::crypto::CryptoProvider;
use rustls::KeyLog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::protocol::ALPN;

pub use identity::{generate_self_signed, load_certs, load_identity, resolve_identity, Identity};
pub use keylog::KeyLogAppender;
pub use verifier::SkipServerVerification;

/// How the client decides whether to trust the server
#[derive(Debug, Clone)]
pub enum ClientTrust {
    /// Accept any certificate
    Insecure,
    /// Mozilla root program via `webpki-roots`
    WebPki,
    /// Only the given roots
    Roots(Vec<CertificateDer<'static>>),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Open the key log if one is configured
pub fn open_key_log(path: Option<PathBuf>) -> Result<Option<Arc<dyn KeyLog>>> {
    match path {
        Some(path) => {
            let appender = KeyLogAppender::open(&path)?;
            info!(path = %path.display(), "Logging TLS secrets");
            Ok(Some(Arc::new(appender)))
        }
        None => Ok(None),
    }
}

/// rustls server configuration for the tunnel endpoint
pub fn server_crypto(
    identity: Identity,
    key_log: Option<Arc<dyn KeyLog>>,
) -> Result<rustls::ServerConfig> {
    let mut config = rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("Failed to select TLS versions")?
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain, identity.key)
        .context("Failed to build TLS config")?;

    config.alpn_protocols = vec![ALPN.to_vec()];
    if let Some(key_log) = key_log {
        config.key_log = key_log;
    }

    Ok(config)
}

/// rustls client configuration for dialing the tunnel server
pub fn client_crypto(
    trust: ClientTrust,
    key_log: Option<Arc<dyn KeyLog>>,
) -> Result<rustls::ClientConfig> {
    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .context("Failed to select TLS versions")?;

    let mut config = match trust {
        ClientTrust::Insecure => {
            warn!("TLS certificate verification disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(SkipServerVerification::new(provider))
                .with_no_client_auth()
        }
        ClientTrust::WebPki => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        ClientTrust::Roots(certs) => {
            let mut roots = rustls::RootCertStore::empty();
            for cert in certs {
                roots.add(cert).context("Invalid root certificate")?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    config.alpn_protocols = vec![ALPN.to_vec()];
    if let Some(key_log) = key_log {
        config.key_log = key_log;
    }

    Ok(config)
}

/// quinn server crypto from a rustls config
pub fn quic_server_config(crypto: rustls::ServerConfig) -> Result<quinn::ServerConfig> {
    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(crypto)
        .context("TLS config is not usable for QUIC")?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
}

/// quinn client crypto from a rustls config
pub fn quic_client_config(crypto: rustls::ClientConfig) -> Result<quinn::ClientConfig> {
    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .context("TLS config is not usable for QUIC")?;
    Ok(quinn::ClientConfig::new(Arc::new(crypto)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_crypto_advertises_alpn() {
        let config = server_crypto(generate_self_signed().unwrap(), None).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h3".to_vec()]);
        assert!(quic_server_config(config).is_ok());
    }

    #[test]
    fn test_client_crypto_variants() {
        for trust in [ClientTrust::Insecure, ClientTrust::WebPki] {
            let config = client_crypto(trust, None).unwrap();
            assert_eq!(config.alpn_protocols, vec![b"h3".to_vec()]);
            assert!(quic_client_config(config).is_ok());
        }
    }

    #[test]
    fn test_client_crypto_custom_roots() {
        let identity = generate_self_signed().unwrap();
        let config = client_crypto(ClientTrust::Roots(identity.cert_chain), None);
        assert!(config.is_ok());
    }

    #[test]
    fn test_no_key_log_when_disabled() {
        assert!(open_key_log(None).unwrap().is_none());
    }
}
