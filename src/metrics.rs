//! Prometheus metrics for the odds pipeline.
//!
//! Covers provider latency, cache effectiveness, detection volume and
//! bet settlement.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Full scan cycle latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "scan_latency_ms";
/// Detection pass latency metric name.
pub const METRIC_DETECTION_LATENCY: &str = "opportunity_detection_latency_ms";
/// Result check cycle latency metric name.
pub const METRIC_RESOLVE_LATENCY: &str = "resolve_cycle_latency_ms";
/// Odds cache hits counter metric name.
pub const METRIC_CACHE_HITS: &str = "odds_cache_hits_total";
/// Odds cache misses counter metric name.
pub const METRIC_CACHE_MISSES: &str = "odds_cache_misses_total";
/// Provider errors counter metric name.
pub const METRIC_PROVIDER_ERRORS: &str = "provider_errors_total";
/// Arbitrage opportunities counter metric name.
pub const METRIC_ARBITRAGE_DETECTED: &str = "arbitrage_detected_total";
/// EV opportunities counter metric name.
pub const METRIC_EV_DETECTED: &str = "ev_detected_total";
/// Alerts published counter metric name.
pub const METRIC_ALERTS_SENT: &str = "alerts_sent_total";
/// Alerts dropped (full channel) counter metric name.
pub const METRIC_ALERTS_DROPPED: &str = "alerts_dropped_total";
/// Bets placed counter metric name.
pub const METRIC_BETS_PLACED: &str = "bets_placed_total";
/// Bets settled counter metric name.
pub const METRIC_BETS_SETTLED: &str = "bets_settled_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "Odds provider request latency in milliseconds"
    );
    describe_histogram!(METRIC_SCAN_LATENCY, "Full scan cycle latency in milliseconds");
    describe_histogram!(
        METRIC_DETECTION_LATENCY,
        "Arbitrage and EV detection latency in milliseconds"
    );
    describe_histogram!(
        METRIC_RESOLVE_LATENCY,
        "Result check cycle latency in milliseconds"
    );

    // Counters
    describe_counter!(METRIC_CACHE_HITS, "Odds cache hits");
    describe_counter!(METRIC_CACHE_MISSES, "Odds cache misses");
    describe_counter!(METRIC_PROVIDER_ERRORS, "Odds provider errors by kind");
    describe_counter!(
        METRIC_ARBITRAGE_DETECTED,
        "Total number of arbitrage opportunities detected"
    );
    describe_counter!(METRIC_EV_DETECTED, "Total number of EV opportunities detected");
    describe_counter!(METRIC_ALERTS_SENT, "Total number of alerts published");
    describe_counter!(
        METRIC_ALERTS_DROPPED,
        "Alerts dropped because the notification channel was full"
    );
    describe_counter!(METRIC_BETS_PLACED, "Total number of bets registered");
    describe_counter!(METRIC_BETS_SETTLED, "Total number of bets settled, by result");

    debug!("Metrics initialized");
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment cache hit counter.
pub fn inc_cache_hits(resource: &'static str) {
    counter!(METRIC_CACHE_HITS, "resource" => resource).increment(1);
}

/// Increment cache miss counter.
pub fn inc_cache_misses(resource: &'static str) {
    counter!(METRIC_CACHE_MISSES, "resource" => resource).increment(1);
}

/// Increment provider error counter.
pub fn inc_provider_errors(kind: &'static str) {
    counter!(METRIC_PROVIDER_ERRORS, "kind" => kind).increment(1);
}

/// Add to the arbitrage opportunities counter.
pub fn add_arbitrage_detected(count: usize) {
    counter!(METRIC_ARBITRAGE_DETECTED).increment(count as u64);
}

/// Add to the EV opportunities counter.
pub fn add_ev_detected(count: usize) {
    counter!(METRIC_EV_DETECTED).increment(count as u64);
}

/// Increment alerts sent counter.
pub fn inc_alerts_sent(kind: &'static str) {
    counter!(METRIC_ALERTS_SENT, "kind" => kind).increment(1);
}

/// Increment alerts dropped counter.
pub fn inc_alerts_dropped() {
    counter!(METRIC_ALERTS_DROPPED).increment(1);
}

/// Increment bets placed counter.
pub fn inc_bets_placed() {
    counter!(METRIC_BETS_PLACED).increment(1);
}

/// Increment bets settled counter.
pub fn inc_bets_settled(result: &'static str) {
    counter!(METRIC_BETS_SETTLED, "result" => result).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a scan cycle.
pub fn timer_scan() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_LATENCY)
}

/// Create a latency timer for opportunity detection.
pub fn timer_detection() -> LatencyTimer {
    LatencyTimer::new(METRIC_DETECTION_LATENCY)
}

/// Create a latency timer for a result check cycle.
pub fn timer_resolve() -> LatencyTimer {
    LatencyTimer::new(METRIC_RESOLVE_LATENCY)
}
