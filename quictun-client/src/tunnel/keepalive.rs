//! Session keepalive
//!
//! Sends one `KEEP_ALIVE` datagram per interval for as long as the session
//! lives. Datagrams are unreliable, so a failed send is counted and
//! otherwise ignored.

use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use quictun::metrics::METRICS;
use quictun::protocol::KEEPALIVE_PAYLOAD;

/// The part of a session the keepalive needs
pub trait DatagramSender: Send + Sync + 'static {
    type Error: fmt::Display;

    /// Queue one unreliable datagram without waiting
    fn send(&self, payload: Bytes) -> Result<(), Self::Error>;

    /// Resolves once the session is closed
    fn wait_closed(&self) -> impl Future<Output = ()> + Send;
}

impl DatagramSender for quinn::Connection {
    type Error = quinn::SendDatagramError;

    fn send(&self, payload: Bytes) -> Result<(), Self::Error> {
        self.send_datagram(payload)
    }

    fn wait_closed(&self) -> impl Future<Output = ()> + Send {
        let connection = self.clone();
        async move {
            connection.closed().await;
        }
    }
}

/// Send keepalives every `period` until the session closes
pub async fn run_keepalive<S: DatagramSender>(session: S, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    let payload = Bytes::from_static(KEEPALIVE_PAYLOAD);
    let closed = session.wait_closed();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = &mut closed => {
                debug!("Session closed, keepalive stopped");
                break;
            }
            _ = ticker.tick() => {
                match session.send(payload.clone()) {
                    Ok(()) => {
                        METRICS.keepalive_sent();
                        trace!("Keepalive sent");
                    }
                    Err(e) => {
                        METRICS.keepalive_failed();
                        trace!(error = %e, "Keepalive send failed");
                    }
                }
            }
        }
    }
}

/// Background keepalive bound to one session
pub struct KeepaliveTask {
    handle: JoinHandle<()>,
}

impl KeepaliveTask {
    pub fn spawn<S: DatagramSender>(session: S, period: Duration) -> Self {
        Self {
            handle: tokio::spawn(run_keepalive(session, period)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    #[derive(Clone)]
    struct MockSession {
        attempts: Arc<Mutex<Vec<Bytes>>>,
        fail: bool,
        closed: watch::Receiver<bool>,
    }

    impl DatagramSender for MockSession {
        type Error = &'static str;

        fn send(&self, payload: Bytes) -> Result<(), Self::Error> {
            self.attempts.lock().unwrap().push(payload);
            if self.fail {
                Err("datagrams unsupported by peer")
            } else {
                Ok(())
            }
        }

        fn wait_closed(&self) -> impl Future<Output = ()> + Send {
            let mut closed = self.closed.clone();
            async move {
                let _ = closed.wait_for(|closed| *closed).await;
            }
        }
    }

    fn mock(fail: bool) -> (MockSession, watch::Sender<bool>) {
        let (close_tx, closed) = watch::channel(false);
        let session = MockSession {
            attempts: Arc::new(Mutex::new(Vec::new())),
            fail,
            closed,
        };
        (session, close_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_datagram_per_interval() {
        let (session, _close_tx) = mock(false);
        let task = KeepaliveTask::spawn(session.clone(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(10)).await;

        let attempts = session.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 3);
        assert!(attempts.iter().all(|p| p.as_ref() == b"KEEP_ALIVE"));
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failures_are_not_fatal() {
        let (session, _close_tx) = mock(true);
        let task = KeepaliveTask::spawn(session.clone(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(session.attempts.lock().unwrap().len(), 3);
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_session_closes() {
        let (session, close_tx) = mock(false);
        let handle = tokio::spawn(run_keepalive(session.clone(), Duration::from_secs(3)));

        tokio::time::sleep(Duration::from_secs(4)).await;
        close_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("keepalive kept running after close")
            .unwrap();
        assert_eq!(session.attempts.lock().unwrap().len(), 1);
    }
}
