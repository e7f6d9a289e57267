//! Protocol-level constants
//!
//! The tunnel has no framing of its own: each forwarded TCP connection is
//! one bidirectional QUIC stream carrying opaque bytes. These are the only
//! choices made on top of the transport.

use quinn::VarInt;

/// Application protocol identifier advertised by both ends.
pub const ALPN: &[u8] = b"h3";

/// Payload of the periodic liveness datagram.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"KEEP_ALIVE";

/// Application error code used to cancel a stream abnormally.
pub const ABORT_CODE: VarInt = VarInt::from_u32(0x10);

/// Application close code and reason for an orderly session shutdown.
pub const CLOSE_CODE: VarInt = VarInt::from_u32(0);
pub const CLOSE_REASON: &[u8] = b"bye";
