// Pipeline metrics module
//
// Lightweight counters for monitoring how many change events were seen,
// suppressed, and delivered.

use crate::models::Destination;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics
///
/// Uses atomic operations so one instance can be shared behind an `Arc`
/// without locks. Counters can be logged on shutdown or periodically.
#[derive(Debug)]
pub struct Metrics {
    /// Change events handed to the dispatcher
    pub events_received: AtomicU64,

    /// Events dropped before any record was built (import, ignore list, unchanged)
    pub events_suppressed: AtomicU64,

    /// Change records built and offered to sinks
    pub records_built: AtomicU64,

    /// Successful sink invocations, per destination
    pub structured_deliveries: AtomicU64,
    pub text_deliveries: AtomicU64,
    pub notify_deliveries: AtomicU64,

    /// Sink invocations that had nothing to do (no table, no lines, no address)
    pub sinks_skipped: AtomicU64,

    /// Sink invocations that returned an error
    pub sink_failures: AtomicU64,

    /// Metrics start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_suppressed: AtomicU64::new(0),
            records_built: AtomicU64::new(0),
            structured_deliveries: AtomicU64::new(0),
            text_deliveries: AtomicU64::new(0),
            notify_deliveries: AtomicU64::new(0),
            sinks_skipped: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed(&self) {
        self.events_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_built(&self) {
        self.records_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, destination: Destination) {
        let counter = match destination {
            Destination::Structured => &self.structured_deliveries,
            Destination::Text => &self.text_deliveries,
            Destination::Notify => &self.notify_deliveries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.sinks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deliveries(&self) -> u64 {
        self.structured_deliveries.load(Ordering::Relaxed)
            + self.text_deliveries.load(Ordering::Relaxed)
            + self.notify_deliveries.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Config Log Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Events: {} received, {} suppressed, {} records built",
            self.events_received.load(Ordering::Relaxed),
            self.events_suppressed.load(Ordering::Relaxed),
            self.records_built.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Deliveries: {} structured, {} text, {} notify, {} skipped, {} failed",
            self.structured_deliveries.load(Ordering::Relaxed),
            self.text_deliveries.load(Ordering::Relaxed),
            self.notify_deliveries.load(Ordering::Relaxed),
            self.sinks_skipped.load(Ordering::Relaxed),
            self.sink_failures.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.events_received.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.deliveries(), 0);
    }

    #[test]
    fn test_delivery_counters_per_destination() {
        let metrics = Metrics::new();

        metrics.record_delivery(Destination::Structured);
        metrics.record_delivery(Destination::Text);
        metrics.record_delivery(Destination::Text);
        metrics.record_skipped();
        metrics.record_failure();

        assert_eq!(metrics.sinks_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.structured_deliveries.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.text_deliveries.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.notify_deliveries.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.sink_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deliveries(), 3);
    }

    #[test]
    fn test_event_counters() {
        let metrics = Metrics::new();

        metrics.record_event();
        metrics.record_event();
        metrics.record_suppressed();
        metrics.record_built();

        assert_eq!(metrics.events_received.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.events_suppressed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.records_built.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
