//! Metrics and observability
//!
//! Atomic counters on the forwarding path, optionally exported to Prometheus.

mod counters;
mod exporter;

pub use counters::*;
pub use exporter::init_metrics;
