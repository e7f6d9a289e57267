//! Prometheus metrics exporter
//!
//! HTTP endpoint for Prometheus scraping.

use ::metrics::{counter, describe_counter, describe_gauge, gauge};
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

use super::counters::{MetricsSnapshot, METRICS};
use crate::config::MetricsConfig;

/// Initialize the Prometheus metrics exporter
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    describe_counter!("quictun_sessions_total", "Total QUIC sessions established");
    describe_gauge!("quictun_sessions_active", "Currently open QUIC sessions");
    describe_counter!("quictun_sessions_failed", "Failed session handshakes");
    describe_counter!("quictun_bridges_total", "Total forwarded connections");
    describe_gauge!("quictun_bridges_active", "Currently forwarded connections");
    describe_counter!("quictun_bridges_aborted", "Forwarded connections torn down abnormally");
    describe_counter!("quictun_bytes_upstream", "Bytes copied from TCP into streams");
    describe_counter!("quictun_bytes_downstream", "Bytes copied from streams into TCP");
    describe_counter!("quictun_dial_failures", "Destination dial failures");
    describe_counter!("quictun_open_failures", "Stream open failures");
    describe_counter!("quictun_keepalives_sent", "Keepalive datagrams sent");
    describe_counter!("quictun_keepalives_failed", "Keepalive datagrams not sent");
    describe_counter!("quictun_keepalives_received", "Keepalive datagrams received");

    PrometheusBuilder::new()
        .with_http_listener(config.bind_addr)
        .install()?;

    tokio::spawn(sync_metrics_task());

    Ok(())
}

/// Periodically push deltas of the atomic counters into the metrics recorder
async fn sync_metrics_task() {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut last = MetricsSnapshot::default();

    loop {
        interval.tick().await;
        let now = METRICS.snapshot();

        increment("quictun_sessions_total", now.sessions_total, last.sessions_total);
        increment("quictun_sessions_failed", now.sessions_failed, last.sessions_failed);
        increment("quictun_bridges_total", now.bridges_total, last.bridges_total);
        increment("quictun_bridges_aborted", now.bridges_aborted, last.bridges_aborted);
        increment("quictun_bytes_upstream", now.bytes_upstream, last.bytes_upstream);
        increment("quictun_bytes_downstream", now.bytes_downstream, last.bytes_downstream);
        increment("quictun_dial_failures", now.dial_failures, last.dial_failures);
        increment("quictun_open_failures", now.open_failures, last.open_failures);
        increment("quictun_keepalives_sent", now.keepalives_sent, last.keepalives_sent);
        increment("quictun_keepalives_failed", now.keepalives_failed, last.keepalives_failed);
        increment(
            "quictun_keepalives_received",
            now.keepalives_received,
            last.keepalives_received,
        );

        gauge!("quictun_sessions_active").set(now.sessions_active as f64);
        gauge!("quictun_bridges_active").set(now.bridges_active as f64);

        last = now;
    }
}

fn increment(name: &'static str, now: u64, last: u64) {
    let delta = now.saturating_sub(last);
    if delta > 0 {
        counter!(name).increment(delta);
    }
}
