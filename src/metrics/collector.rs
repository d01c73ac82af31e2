use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Ring buffer capacity for latency samples
const RING_BUFFER_CAPACITY: usize = 1024;

/// Metrics collector for the gateway
///
/// Counters are lock-free; only the latency ring buffer takes a mutex.
pub struct MetricsCollector {
    /// Requests currently being served
    active_requests: AtomicU64,

    /// Lifetime total request count
    total_requests: AtomicU64,

    /// Lifetime total error count
    total_errors: AtomicU64,

    /// Errors keyed by type
    errors_by_type: DashMap<String, AtomicU64>,

    /// Login round-trips sent to Protege
    logins: AtomicU64,

    /// Queue lookups sent to Protege (retries included)
    upstream_lookups: AtomicU64,

    /// Lookups repeated after a 401
    unauthorized_retries: AtomicU64,

    /// Latest request latencies in milliseconds
    latency_samples: Mutex<VecDeque<f64>>,
}

/// Point-in-time copy of the counters, reported by `/health`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub active_requests: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub errors_by_type: BTreeMap<String, u64>,
    pub logins: u64,
    pub upstream_lookups: u64,
    pub unauthorized_retries: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            active_requests: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            errors_by_type: DashMap::new(),
            logins: AtomicU64::new(0),
            upstream_lookups: AtomicU64::new(0),
            unauthorized_retries: AtomicU64::new(0),
            latency_samples: Mutex::new(VecDeque::with_capacity(RING_BUFFER_CAPACITY)),
        }
    }

    /// Record the start of a request
    pub fn record_request_start(&self) {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a request
    pub fn record_request_end(&self, latency_ms: f64) {
        self.active_requests.fetch_sub(1, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() >= RING_BUFFER_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    /// Record an error
    pub fn record_error(&self, error_type: &str) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);

        self.errors_by_type
            .entry(error_type.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_login(&self) {
        self.logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_lookup(&self) {
        self.upstream_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized_retry(&self) {
        self.unauthorized_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of login round-trips so far
    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Number of queue lookups so far
    pub fn upstream_lookups(&self) -> u64 {
        self.upstream_lookups.load(Ordering::Relaxed)
    }

    /// Get latency percentiles (p50, p95)
    pub fn get_latency_percentiles(&self) -> (f64, f64) {
        let samples = match self.latency_samples.lock() {
            Ok(s) => s,
            Err(_) => return (0.0, 0.0),
        };

        if samples.is_empty() {
            return (0.0, 0.0);
        }

        let mut latencies: Vec<f64> = samples.iter().copied().collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let len = latencies.len();
        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;

        (latencies[p50_idx.min(len - 1)], latencies[p95_idx.min(len - 1)])
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (latency_p50_ms, latency_p95_ms) = self.get_latency_percentiles();

        MetricsSnapshot {
            active_requests: self.active_requests.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            errors_by_type: self
                .errors_by_type
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
            logins: self.logins(),
            upstream_lookups: self.upstream_lookups(),
            unauthorized_retries: self.unauthorized_retries.load(Ordering::Relaxed),
            latency_p50_ms,
            latency_p95_ms,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
