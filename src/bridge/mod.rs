//! TCP socket to QUIC stream forwarding
//!
//! Used by both tunnel roles: the server bridges accepted streams to dialed
//! destination sockets, the client bridges accepted sockets to opened streams.

mod halves;
mod pair;

pub use halves::{abort_stream, reset_tcp, Sink, Source};
pub use pair::{Bridge, BridgeReport, Direction, Termination};
