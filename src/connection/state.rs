//! Session state

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// QUIC handshake in progress
    Handshaking,
    /// Accepting streams
    Active,
    /// Server is shutting down
    Draining,
    /// Session ended
    Closed,
}

/// Per-session bookkeeping on the server
#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub phase: SessionPhase,
    pub started_at: Instant,
    /// Streams currently bridged
    pub active_streams: u32,
    /// Streams accepted over the session lifetime
    pub total_streams: u64,
    pub last_keepalive: Option<Instant>,
}

impl SessionState {
    pub fn new(id: SessionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            phase: SessionPhase::Handshaking,
            started_at: Instant::now(),
            active_streams: 0,
            total_streams: 0,
            last_keepalive: None,
        }
    }

    pub fn set_active(&mut self) {
        self.phase = SessionPhase::Active;
    }

    pub fn set_draining(&mut self) {
        self.phase = SessionPhase::Draining;
    }

    pub fn set_closed(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn stream_opened(&mut self) {
        self.active_streams = self.active_streams.saturating_add(1);
        self.total_streams = self.total_streams.saturating_add(1);
    }

    pub fn stream_closed(&mut self) {
        self.active_streams = self.active_streams.saturating_sub(1);
    }

    pub fn keepalive_received(&mut self) {
        self.last_keepalive = Some(Instant::now());
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}
