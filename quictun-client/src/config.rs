//! Configuration management
//!
//! Client configuration comes from the command line, optionally layered on
//! top of a TOML file sharing the server's transport, logging, key-log and
//! metrics tables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use quictun::config::{KeylogConfig, LoggingConfig, MetricsConfig, QuicConfig};

/// Default client key-log location
pub const CLIENT_KEYLOG_PATH: &str = "private/sslkeys.log";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub quic: QuicConfig,
    #[serde(default)]
    pub keylog: KeylogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client tunnel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Local TCP address accepting connections to forward
    #[serde(default = "default_client_listen")]
    pub listen: String,
    /// Tunnel server address (host:port)
    #[serde(default)]
    pub remote: String,
    /// Server name for TLS SNI (defaults to host from `remote`)
    #[serde(default)]
    pub server_name: Option<String>,
    /// Verify the server certificate instead of accepting any
    #[serde(default)]
    pub verify: bool,
    /// PEM roots to verify against instead of the bundled web roots
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    /// Upper bound on session establishment
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Interval between keepalive datagrams
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen: default_client_listen(),
            remote: String::new(),
            server_name: None,
            verify: false,
            ca_path: None,
            connect_timeout_secs: default_connect_timeout(),
            keepalive_interval_secs: default_keepalive_interval(),
        }
    }
}

impl ClientConfig {
    /// Get the server name for TLS SNI
    pub fn get_server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or_else(|| {
            let host = self
                .remote
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or(&self.remote);
            // IPv6 literals arrive as "[::1]:443"
            host.trim_start_matches('[').trim_end_matches(']')
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

// Default value functions
fn default_client_listen() -> String { "127.0.0.1:8080".to_string() }
fn default_connect_timeout() -> u64 { 3 }
fn default_keepalive_interval() -> u64 { 3 }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Load from a file when one is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.client.remote.is_empty() {
            anyhow::bail!("client.remote must not be empty");
        }
        if self.client.connect_timeout_secs == 0 {
            anyhow::bail!("client.connect_timeout_secs must be > 0");
        }
        if self.client.keepalive_interval_secs == 0 {
            anyhow::bail!("client.keepalive_interval_secs must be > 0");
        }
        if self.client.ca_path.is_some() && !self.client.verify {
            anyhow::bail!("client.ca_path requires client.verify");
        }
        self.quic.validate()
    }
}
