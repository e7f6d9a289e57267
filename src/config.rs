//! Configuration management
//!
//! Server configuration comes from the command line, optionally layered on
//! top of a TOML file. The transport, logging, key-log and metrics tables
//! are shared with the client.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub quic: QuicConfig,
    #[serde(default)]
    pub keylog: KeylogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Local UDP address for inbound QUIC sessions
    #[serde(default = "default_server_listen")]
    pub listen: String,
    /// Fixed TCP destination every stream is forwarded to (host:port)
    #[serde(default)]
    pub destination: String,
    /// Upper bound on a single inbound handshake
    #[serde(default = "default_server_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Upper bound on dialing the destination for one stream
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    /// How long shutdown waits for sessions to go away
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_server_listen(),
            destination: String::new(),
            handshake_timeout_secs: default_server_handshake_timeout(),
            dial_timeout_secs: default_dial_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// TLS identity configuration
///
/// When neither path is set a short-lived self-signed identity is generated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Path to PEM certificate chain
    pub cert_path: Option<PathBuf>,
    /// Path to PEM private key
    pub key_path: Option<PathBuf>,
}

/// QUIC transport tuning, shared by both roles
#[derive(Debug, Clone, Deserialize)]
pub struct QuicConfig {
    /// Session idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Maximum concurrent bidirectional streams the peer may open
    #[serde(default = "default_max_streams")]
    pub max_concurrent_streams: u32,
    /// Per-stream receive window in bytes
    #[serde(default = "default_stream_receive_window")]
    pub stream_receive_window: u32,
    /// Connection-wide receive window in bytes
    #[serde(default = "default_receive_window")]
    pub receive_window: u32,
    /// Datagram send/receive buffer in bytes
    #[serde(default = "default_datagram_buffer")]
    pub datagram_buffer_size: usize,
    /// Enable path MTU discovery
    #[serde(default)]
    pub mtu_discovery: bool,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            max_concurrent_streams: default_max_streams(),
            stream_receive_window: default_stream_receive_window(),
            receive_window: default_receive_window(),
            datagram_buffer_size: default_datagram_buffer(),
            mtu_discovery: false,
        }
    }
}

impl QuicConfig {
    /// Validate transport values
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            anyhow::bail!("quic.idle_timeout_secs must be > 0");
        }
        if self.max_concurrent_streams == 0 {
            anyhow::bail!("quic.max_concurrent_streams must be > 0");
        }
        if self.stream_receive_window == 0 || self.receive_window == 0 {
            anyhow::bail!("quic receive windows must be > 0");
        }
        if self.stream_receive_window > self.receive_window {
            anyhow::bail!("quic.stream_receive_window must not exceed quic.receive_window");
        }
        Ok(())
    }
}

/// TLS key-log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeylogConfig {
    /// Append session secrets for external decryption tooling
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Key-log file; each role has its own default location
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for KeylogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl KeylogConfig {
    /// Resolve the file to write, `None` when key logging is off
    pub fn resolve(&self, default_path: &str) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        Some(
            self.path
                .clone()
                .unwrap_or_else(|| PathBuf::from(default_path)),
        )
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_server_listen() -> String { "127.0.0.1:8443".to_string() }
fn default_server_handshake_timeout() -> u64 { 10 }
fn default_dial_timeout() -> u64 { 10 }
fn default_drain_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_streams() -> u32 { 100 }
fn default_stream_receive_window() -> u32 { 512 * 1024 }
fn default_receive_window() -> u32 { 16 * 1024 * 1024 }
fn default_datagram_buffer() -> usize { 64 * 1024 }
fn default_true() -> bool { true }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

/// Default server key-log location
pub const SERVER_KEYLOG_PATH: &str = "sslkeys.log";

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
        if self.server.destination.is_empty() {
            anyhow::bail!("server.destination must not be empty");
        }
        if self.server.handshake_timeout_secs == 0 {
            anyhow::bail!("server.handshake_timeout_secs must be > 0");
        }
        if self.server.dial_timeout_secs == 0 {
            anyhow::bail!("server.dial_timeout_secs must be > 0");
        }
        if self.tls.cert_path.is_some() != self.tls.key_path.is_some() {
            anyhow::bail!("tls.cert_path and tls.key_path must be given together");
        }
        self.quic.validate()
    }
}
