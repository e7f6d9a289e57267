//! Socket utilities and tuning

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::error::TunnelError;

/// Socket buffer sizes for the QUIC endpoint
pub const RECV_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB
pub const SEND_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8MB

/// Create a UDP socket for a QUIC endpoint
pub fn create_udp_socket(addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;

    // The kernel may clamp these; a smaller buffer is not fatal.
    let _ = socket.set_recv_buffer_size(RECV_BUFFER_SIZE);
    let _ = socket.set_send_buffer_size(SEND_BUFFER_SIZE);

    socket.set_nonblocking(true)?;

    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind UDP socket to {}", addr))?;

    Ok(socket.into())
}

/// Dial a TCP destination, bounded by `timeout`, and tune the socket for
/// interactive forwarding
pub async fn dial_tcp(destination: &str, timeout: Duration) -> Result<TcpStream, TunnelError> {
    let connect = TcpStream::connect(destination);
    let stream = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| TunnelError::DialTimeout {
            destination: destination.to_string(),
            timeout,
        })?
        .map_err(|source| TunnelError::Dial {
            destination: destination.to_string(),
            source,
        })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Resolve a `host:port` string to a single socket address
pub async fn resolve_addr(address: &str) -> Result<SocketAddr> {
    // Try parsing as socket address first
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // DNS resolution
    let mut addrs = tokio::net::lookup_host(address)
        .await
        .with_context(|| format!("Failed to resolve {}", address))?;

    addrs
        .next()
        .ok_or_else(|| TunnelError::Unresolved(address.to_string()).into())
}

/// Wildcard bind address in the same family as `remote`
pub fn unspecified_for(remote: SocketAddr) -> SocketAddr {
    if remote.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}
