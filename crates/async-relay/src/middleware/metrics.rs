//! Relay metrics.
//!
//! Plain atomic counters exported as JSON on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Relay metrics
#[derive(Default)]
pub struct RelayMetrics {
    // HTTP request counters
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,

    // Dispatcher counters
    pub submitted: AtomicU64,
    pub delivered: AtomicU64,
    pub timeouts: AtomicU64,
    pub forward_failures: AtomicU64,
    pub rejected_acks: AtomicU64,

    // Callback intake counters
    pub unknown_callbacks: AtomicU64,
    pub malformed_callbacks: AtomicU64,

    // Latency tracking (sum and count)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed HTTP request
    pub fn record_request(&self, success: bool, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward_failure(&self) {
        self.forward_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Peer answered a forward with a non-success status
    pub fn record_rejected_ack(&self) {
        self.rejected_acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_callback(&self) {
        self.unknown_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_callback(&self) {
        self.malformed_callbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests": {
                "total": self.requests_total.load(Ordering::Relaxed),
                "success": self.requests_success.load(Ordering::Relaxed),
                "error": self.requests_error.load(Ordering::Relaxed),
            },
            "relay": {
                "submitted": self.submitted.load(Ordering::Relaxed),
                "delivered": self.delivered.load(Ordering::Relaxed),
                "timeouts": self.timeouts.load(Ordering::Relaxed),
                "forward_failures": self.forward_failures.load(Ordering::Relaxed),
                "rejected_acks": self.rejected_acks.load(Ordering::Relaxed),
            },
            "callbacks": {
                "unknown": self.unknown_callbacks.load(Ordering::Relaxed),
                "malformed": self.malformed_callbacks.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Request timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<RelayMetrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, success: bool) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics.record_request(success, latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = RelayMetrics::new();

        metrics.record_request(true, 100);
        metrics.record_request(true, 200);
        metrics.record_request(false, 50);

        assert_eq!(metrics.requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.requests_success.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.requests_error.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_average_latency() {
        let metrics = RelayMetrics::new();

        metrics.record_request(true, 100);
        metrics.record_request(true, 200);
        metrics.record_request(true, 300);

        assert!((metrics.average_latency_ms() - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_request_timer() {
        let metrics = Arc::new(RelayMetrics::new());
        RequestTimer::new(Arc::clone(&metrics)).finish(false);

        assert_eq!(metrics.requests_error.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.request_count_for_latency.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_json_export() {
        let metrics = RelayMetrics::new();
        metrics.record_request(true, 100);
        metrics.record_submitted();
        metrics.record_timeout();
        metrics.record_unknown_callback();

        let json = metrics.to_json();
        assert_eq!(json["requests"]["total"], 1);
        assert_eq!(json["relay"]["submitted"], 1);
        assert_eq!(json["relay"]["timeouts"], 1);
        assert_eq!(json["callbacks"]["unknown"], 1);
    }
}
