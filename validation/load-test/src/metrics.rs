//! Metrics collection and statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::dispatch::FetchOutcome;

/// Counters and latency histogram for one bucket of requests.
struct RequestStats {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    cache_hits: u64,
    cache_misses: u64,
    bytes_total: u64,
    status_counts: BTreeMap<u16, u64>,
}

impl RequestStats {
    fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            cache_hits: 0,
            cache_misses: 0,
            bytes_total: 0,
            status_counts: BTreeMap::new(),
        }
    }

    fn record(&mut self, outcome: &FetchOutcome) {
        self.requests_total += 1;
        *self.status_counts.entry(outcome.status).or_default() += 1;

        if !outcome.is_success() {
            self.requests_failed += 1;
            return;
        }

        self.requests_success += 1;
        self.bytes_total += outcome.bytes as u64;
        self.histogram
            .record(outcome.elapsed.as_micros() as u64)
            .ok();

        if outcome.cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    fn latency_ms(&self, percentile: f64) -> f64 {
        self.histogram.value_at_percentile(percentile) as f64 / 1000.0
    }

    fn summary(&self, name: &str, duration_secs: f64) -> RequestSummary {
        RequestSummary {
            name: name.to_string(),
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            requests_per_second: per_second(self.requests_total as f64, duration_secs),
            latency_p50: self.latency_ms(50.0),
            latency_p95: self.latency_ms(95.0),
            latency_p99: self.latency_ms(99.0),
            latency_max: self.histogram.max() as f64 / 1000.0,
            latency_avg: self.histogram.mean() / 1000.0,
            status_counts: self.status_counts.clone(),
        }
    }
}

fn per_second(value: f64, duration_secs: f64) -> f64 {
    if duration_secs > 0.0 {
        value / duration_secs
    } else {
        0.0
    }
}

/// Collects metrics during load test execution, overall and per request name.
pub struct MetricsCollector {
    overall: RequestStats,
    by_name: BTreeMap<String, RequestStats>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            overall: RequestStats::new(),
            by_name: BTreeMap::new(),
        }
    }

    /// Record one outcome under the request's display name.
    pub fn record(&mut self, name: &str, outcome: &FetchOutcome) {
        self.overall.record(outcome);
        if let Some(stats) = self.by_name.get_mut(name) {
            stats.record(outcome);
        } else {
            let mut stats = RequestStats::new();
            stats.record(outcome);
            self.by_name.insert(name.to_string(), stats);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.overall.requests_total
    }

    /// Generate final test results for a measured phase of `duration`.
    pub fn results(
        &self,
        config_name: String,
        scenario_name: String,
        profiles: Vec<String>,
        users: u32,
        seed: Option<u64>,
        duration: Duration,
    ) -> TestResults {
        let duration_secs = duration.as_secs_f64();
        let overall = &self.overall;

        let cache_total = overall.cache_hits + overall.cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            (overall.cache_hits as f64 / cache_total as f64) * 100.0
        } else {
            0.0
        };

        TestResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_name,
            config_name,
            duration_secs,
            total_requests: overall.requests_total,
            successful_requests: overall.requests_success,
            failed_requests: overall.requests_failed,
            requests_per_second: per_second(overall.requests_total as f64, duration_secs),
            latency_p50: overall.latency_ms(50.0),
            latency_p75: overall.latency_ms(75.0),
            latency_p90: overall.latency_ms(90.0),
            latency_p95: overall.latency_ms(95.0),
            latency_p99: overall.latency_ms(99.0),
            latency_min: overall.histogram.min() as f64 / 1000.0,
            latency_max: overall.histogram.max() as f64 / 1000.0,
            latency_avg: overall.histogram.mean() / 1000.0,
            cache_hit_rate,
            bytes_per_second: per_second(overall.bytes_total as f64, duration_secs),
            profiles,
            users,
            seed,
            requests: self
                .by_name
                .iter()
                .map(|(name, stats)| stats.summary(name, duration_secs))
                .collect(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub timestamp: String,
    pub scenario_name: String,
    pub config_name: String,
    pub duration_secs: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,

    // Latency percentiles (ms)
    pub latency_p50: f64,
    pub latency_p75: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    // Cache stats
    pub cache_hit_rate: f64,

    // Throughput
    pub bytes_per_second: f64,

    // Test configuration
    pub profiles: Vec<String>,
    pub users: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Per request name breakdown, sorted by name
    pub requests: Vec<RequestSummary>,
}

impl TestResults {
    /// Percentage of requests that succeeded, 0 when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Statistics for all requests sharing one display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_max: f64,
    pub latency_avg: f64,
    pub status_counts: BTreeMap<u16, u64>,
}
