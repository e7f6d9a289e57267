//! Server implementation
//!
//! QUIC listener, session handling and stream forwarding.

mod acceptor;
mod listener;

pub use acceptor::SessionHandler;
pub use listener::Server;
