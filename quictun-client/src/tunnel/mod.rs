//! Tunnel management
//!
//! Establishes the QUIC session, keeps it alive and forwards local TCP
//! connections over it.

pub mod connection;
pub mod keepalive;
pub mod listener;

pub use connection::connect;
pub use keepalive::{run_keepalive, DatagramSender, KeepaliveTask};
pub use listener::TunnelClient;
