//! Server identity: load from PEM files or bootstrap a self-signed one

use anyhow::{Context, Result};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::TlsConfig;
use crate::error::TunnelError;

/// Lifetime of a bootstrapped certificate
pub const IDENTITY_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

const SELF_SIGNED_ORGANIZATION: &str = "quictun self-signed";

/// Certificate chain and private key presented by the server
#[derive(Debug)]
pub struct Identity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Use the configured files when present, otherwise generate
pub fn resolve_identity(tls: &TlsConfig) -> Result<Identity> {
    match (&tls.cert_path, &tls.key_path) {
        (Some(cert), Some(key)) => {
            info!(cert = %cert.display(), key = %key.display(), "Loading TLS identity");
            load_identity(cert, key)
        }
        _ => {
            warn!("Generating self-signed certificate (not for production use)");
            generate_self_signed()
        }
    }
}

/// Load a PEM certificate chain and private key
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity> {
    let cert_chain = load_certs(cert_path)?;

    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("Failed to read key file {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .with_context(|| format!("Failed to parse private key {}", key_path.display()))?
        .ok_or_else(|| TunnelError::MissingPrivateKey(key_path.to_path_buf()))?;

    Ok(Identity { cert_chain, key })
}

/// Load every certificate from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .with_context(|| format!("Failed to read certificate file {}", path.display()))?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificates in {}", path.display()))?;

    if certs.is_empty() {
        return Err(TunnelError::MissingCertificate(path.to_path_buf()).into());
    }
    Ok(certs)
}

/// Generate a throwaway server identity
///
/// The certificate names no host, so it is only usable by clients that
/// skip verification.
pub fn generate_self_signed() -> Result<Identity> {
    let params = self_signed_params(OffsetDateTime::now_utc())?;
    let key_pair = KeyPair::generate().context("Failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to generate self-signed certificate")?;

    Ok(Identity {
        cert_chain: vec![cert.der().clone()],
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    })
}

fn self_signed_params(now: OffsetDateTime) -> Result<CertificateParams> {
    let mut params = CertificateParams::new(Vec::<String>::new())?;

    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, SELF_SIGNED_ORGANIZATION);
    params.distinguished_name = name;

    params.not_before = now;
    params.not_after = now + IDENTITY_VALIDITY;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quictun-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_self_signed_params() {
        let now = OffsetDateTime::now_utc();
        let params = self_signed_params(now).unwrap();

        assert!(params.subject_alt_names.is_empty());
        assert_eq!(params.not_after - params.not_before, time::Duration::hours(24));
        assert_eq!(
            params.extended_key_usages,
            vec![ExtendedKeyUsagePurpose::ServerAuth]
        );
    }

    #[test]
    fn test_generated_identity_is_usable() {
        let identity = generate_self_signed().unwrap();
        assert_eq!(identity.cert_chain.len(), 1);
        assert!(super::super::server_crypto(identity, None).is_ok());
    }

    #[test]
    fn test_load_identity_from_pem() {
        let dir = scratch_dir("identity");
        let key_pair = KeyPair::generate().unwrap();
        let cert = self_signed_params(OffsetDateTime::now_utc())
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let identity = load_identity(&cert_path, &key_path).unwrap();
        assert_eq!(identity.cert_chain.len(), 1);
        assert_eq!(identity.cert_chain[0].as_ref(), cert.der().as_ref());

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_files_are_errors() {
        let dir = scratch_dir("missing");
        let err = load_identity(&dir.join("nope.pem"), &dir.join("nope.key"));
        assert!(err.is_err());

        let empty = dir.join("empty.pem");
        std::fs::write(&empty, b"").unwrap();
        let err = load_certs(&empty).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TunnelError>(),
            Some(TunnelError::MissingCertificate(_))
        ));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
