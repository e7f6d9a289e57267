//! QuicTun - TCP over QUIC
//!
//! Every TCP connection accepted by the client becomes one bidirectional
//! stream of a single long-lived QUIC session; the server forwards each
//! stream to one fixed TCP destination. This crate holds the server and
//! everything both roles share.
//!
//! A stream reaches the server only once the local client has sent its
//! first bytes, so the destination is not dialed before then. Protocols
//! where the server speaks first (SMTP, FTP, POP3, MySQL) stall until the
//! client writes something.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod tls;
pub mod transport;
pub mod util;

pub use bridge::{Bridge, BridgeReport, Termination};
pub use config::Config;
pub use error::TunnelError;
pub use server::Server;

/// Version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
