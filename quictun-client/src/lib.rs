//! QuicTun Client Library
//!
//! Forwards local TCP connections to a QuicTun server, one QUIC stream per
//! connection over a single session.

pub mod config;
pub mod tunnel;

pub use config::Config;
pub use tunnel::TunnelClient;

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
