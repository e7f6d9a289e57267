//! QUIC transport tuning shared by both tunnel roles

use anyhow::{Context, Result};
use quinn::{IdleTimeout, TransportConfig, VarInt};
use std::time::Duration;

use crate::config::QuicConfig;

/// Build the quinn transport configuration
///
/// Transport-level keep-alive stays off; liveness is carried by the
/// client's keepalive datagrams instead.
pub fn transport_config(quic: &QuicConfig) -> Result<TransportConfig> {
    let mut transport = TransportConfig::default();

    let idle_timeout = IdleTimeout::try_from(Duration::from_secs(quic.idle_timeout_secs))
        .context("quic.idle_timeout_secs is out of range")?;
    transport.max_idle_timeout(Some(idle_timeout));
    transport.keep_alive_interval(None);

    // Bounds how many forwarded connections can be in flight per session;
    // opening beyond it waits for a slot.
    transport.max_concurrent_bidi_streams(VarInt::from_u32(quic.max_concurrent_streams));
    transport.max_concurrent_uni_streams(VarInt::from_u32(0));

    transport.stream_receive_window(VarInt::from_u32(quic.stream_receive_window));
    transport.receive_window(VarInt::from_u32(quic.receive_window));

    transport.datagram_receive_buffer_size(Some(quic.datagram_buffer_size));
    transport.datagram_send_buffer_size(quic.datagram_buffer_size);

    if !quic.mtu_discovery {
        transport.mtu_discovery_config(None);
    }

    Ok(transport)
}
