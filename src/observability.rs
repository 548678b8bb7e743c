//! Logging setup and dispatch counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured filter. Calling this twice is
/// harmless; the second install is ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counters for the alert dispatch path
#[derive(Debug, Default)]
pub struct Metrics {
    alerts_dispatched: AtomicU64,
    alerts_ignored: AtomicU64,
    alerts_parked: AtomicU64,
    alerts_dropped: AtomicU64,
    events_emitted: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_dispatched(&self) {
        self.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "alerts_dispatched", "Metric incremented");
    }

    pub fn alert_ignored(&self) {
        self.alerts_ignored.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "alerts_ignored", "Metric incremented");
    }

    pub fn alert_parked(&self) {
        self.alerts_parked.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "alerts_parked", "Metric incremented");
    }

    pub fn alerts_dropped(&self, count: u64) {
        self.alerts_dropped.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "alerts_dropped", count, "Metric incremented");
    }

    pub fn event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "events_emitted", "Metric incremented");
    }

    pub fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "dispatch_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            alerts_dispatched: self.alerts_dispatched.load(Ordering::Relaxed),
            alerts_ignored: self.alerts_ignored.load(Ordering::Relaxed),
            alerts_parked: self.alerts_parked.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub alerts_dispatched: u64,
    pub alerts_ignored: u64,
    pub alerts_parked: u64,
    pub alerts_dropped: u64,
    pub events_emitted: u64,
    pub dispatch_failures: u64,
}
