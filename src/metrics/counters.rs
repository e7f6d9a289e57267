//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Session metrics
    pub sessions_total: AtomicU64,
    pub sessions_active: AtomicU64,
    pub sessions_failed: AtomicU64,

    // Bridge metrics
    pub bridges_total: AtomicU64,
    pub bridges_active: AtomicU64,
    pub bridges_aborted: AtomicU64,

    // Traffic metrics, named from the TCP side's point of view
    pub bytes_upstream: AtomicU64,
    pub bytes_downstream: AtomicU64,

    // Per-connection failures
    pub dial_failures: AtomicU64,
    pub open_failures: AtomicU64,

    // Keepalive datagrams
    pub keepalives_sent: AtomicU64,
    pub keepalives_failed: AtomicU64,
    pub keepalives_received: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_failed: AtomicU64::new(0),
            bridges_total: AtomicU64::new(0),
            bridges_active: AtomicU64::new(0),
            bridges_aborted: AtomicU64::new(0),
            bytes_upstream: AtomicU64::new(0),
            bytes_downstream: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            keepalives_sent: AtomicU64::new(0),
            keepalives_failed: AtomicU64::new(0),
            keepalives_received: AtomicU64::new(0),
        }
    }

    // Session tracking
    #[inline]
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Bridge tracking
    #[inline]
    pub fn bridge_opened(&self) {
        self.bridges_total.fetch_add(1, Ordering::Relaxed);
        self.bridges_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn bridge_closed(&self, aborted: bool) {
        self.bridges_active.fetch_sub(1, Ordering::Relaxed);
        if aborted {
            self.bridges_aborted.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Traffic tracking
    #[inline]
    pub fn upstream(&self, count: u64) {
        self.bytes_upstream.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn downstream(&self, count: u64) {
        self.bytes_downstream.fetch_add(count, Ordering::Relaxed);
    }

    // Failure tracking
    #[inline]
    pub fn dial_failed(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn open_failed(&self) {
        self.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Keepalive tracking
    #[inline]
    pub fn keepalive_sent(&self) {
        self.keepalives_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn keepalive_failed(&self) {
        self.keepalives_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn keepalive_received(&self) {
        self.keepalives_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            bridges_total: self.bridges_total.load(Ordering::Relaxed),
            bridges_active: self.bridges_active.load(Ordering::Relaxed),
            bridges_aborted: self.bridges_aborted.load(Ordering::Relaxed),
            bytes_upstream: self.bytes_upstream.load(Ordering::Relaxed),
            bytes_downstream: self.bytes_downstream.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            keepalives_failed: self.keepalives_failed.load(Ordering::Relaxed),
            keepalives_received: self.keepalives_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub sessions_failed: u64,
    pub bridges_total: u64,
    pub bridges_active: u64,
    pub bridges_aborted: u64,
    pub bytes_upstream: u64,
    pub bytes_downstream: u64,
    pub dial_failures: u64,
    pub open_failures: u64,
    pub keepalives_sent: u64,
    pub keepalives_failed: u64,
    pub keepalives_received: u64,
}
