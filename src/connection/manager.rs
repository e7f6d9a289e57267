//! Session registry
//!
//! Tracks every live QUIC session on the server and fans out shutdown.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::state::{SessionId, SessionPhase, SessionState};
use crate::metrics::METRICS;

/// Registry of sessions currently served
pub struct SessionManager {
    sessions: DashMap<SessionId, SessionState>,
    next_id: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        Arc::new(Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            shutdown_tx,
        })
    }

    /// Register an incoming session before its handshake completes
    pub fn register(&self, remote_addr: SocketAddr) -> SessionId {
        let id = SessionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, SessionState::new(id, remote_addr));
        debug!(session = %id, %remote_addr, "Session registered");
        id
    }

    /// Mark the handshake as complete
    pub fn activate(&self, id: SessionId) {
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.set_active();
            METRICS.session_opened();
            info!(session = %id, remote_addr = %state.remote_addr, "Session established");
        }
    }

    pub fn unregister(&self, id: SessionId) {
        if let Some((_, mut state)) = self.sessions.remove(&id) {
            let was_active = state.phase != SessionPhase::Handshaking;
            state.set_closed();
            if was_active {
                METRICS.session_closed();
                info!(
                    session = %id,
                    remote_addr = %state.remote_addr,
                    duration_secs = state.duration().as_secs_f64(),
                    streams = state.total_streams,
                    "Session closed"
                );
            } else {
                METRICS.session_failed();
                debug!(session = %id, "Session dropped before handshake completed");
            }
        }
    }

    pub fn stream_opened(&self, id: SessionId) {
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.stream_opened();
        }
    }

    pub fn stream_closed(&self, id: SessionId) {
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.stream_closed();
        }
    }

    pub fn keepalive_received(&self, id: SessionId) {
        METRICS.keepalive_received();
        if let Some(mut state) = self.sessions.get_mut(&id) {
            state.keepalive_received();
        }
    }

    /// Streams currently bridged for one session
    pub fn active_streams(&self, id: SessionId) -> Option<u32> {
        self.sessions.get(&id).map(|state| state.active_streams)
    }

    pub fn phase(&self, id: SessionId) -> Option<SessionPhase> {
        self.sessions.get(&id).map(|state| state.phase)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn signal_shutdown(&self) {
        info!("Signaling shutdown to all sessions");
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for sessions to unregister, bounded by `timeout`
    pub async fn drain(&self, timeout: Duration) {
        info!(sessions = self.session_count(), "Starting session drain");

        for mut entry in self.sessions.iter_mut() {
            if entry.is_active() {
                entry.value_mut().set_draining();
            }
        }

        let start = tokio::time::Instant::now();
        while self.session_count() > 0 && start.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.session_count();
        if remaining > 0 {
            warn!(remaining, "Closing remaining sessions after drain timeout");
        } else {
            info!("All sessions drained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let manager = SessionManager::new();
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();

        let id = manager.register(addr);
        assert_eq!(manager.session_count(), 1);
        assert_eq!(manager.phase(id), Some(SessionPhase::Handshaking));

        manager.activate(id);
        assert_eq!(manager.phase(id), Some(SessionPhase::Active));

        manager.stream_opened(id);
        manager.stream_opened(id);
        manager.stream_closed(id);
        assert_eq!(manager.active_streams(id), Some(1));

        manager.unregister(id);
        assert_eq!(manager.session_count(), 0);
        assert_eq!(manager.active_streams(id), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let manager = SessionManager::new();
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_ne!(manager.register(addr), manager.register(addr));
    }

    #[tokio::test]
    async fn test_shutdown_reaches_subscribers() {
        let manager = SessionManager::new();
        let mut rx = manager.subscribe_shutdown();
        manager.signal_shutdown();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_unregister() {
        let manager = SessionManager::new();
        let id = manager.register("127.0.0.1:1".parse().unwrap());
        manager.activate(id);

        let remover = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            remover.unregister(id);
        });

        manager.drain(Duration::from_secs(30)).await;
        assert_eq!(manager.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded() {
        let manager = SessionManager::new();
        let id = manager.register("127.0.0.1:1".parse().unwrap());
        manager.activate(id);

        manager.drain(Duration::from_secs(1)).await;
        assert_eq!(manager.session_count(), 1);
        assert_eq!(manager.phase(id), Some(SessionPhase::Draining));
    }
}
