// Scan metrics
//
// Lock-free counters for one scanner instance, logged at the end of a run.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Scan counters, updated with relaxed atomics from any task
#[derive(Debug)]
pub struct Metrics {
    pub logs_parsed: AtomicUsize,
    pub logs_skipped: AtomicUsize,
    pub logs_failed: AtomicUsize,

    /// Results served from the analysis cache instead of parsing
    pub cache_hits: AtomicUsize,

    /// Calls rejected by an open circuit breaker
    pub breaker_rejections: AtomicU64,

    /// Time spent parsing, in milliseconds (cache hits excluded)
    pub total_parse_time_ms: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            logs_parsed: AtomicUsize::new(0),
            logs_skipped: AtomicUsize::new(0),
            logs_failed: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            breaker_rejections: AtomicU64::new(0),
            total_parse_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_log_parsed(&self, elapsed: Duration) {
        self.logs_parsed.fetch_add(1, Ordering::Relaxed);
        self.total_parse_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_log_skipped(&self) {
        self.logs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_failed(&self) {
        self.logs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_breaker_rejection(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average parse time per parsed log in milliseconds
    pub fn avg_parse_time_ms(&self) -> f64 {
        let total = self.total_parse_time_ms.load(Ordering::Relaxed);
        let count = self.logs_parsed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self, retries: u64) {
        tracing::info!("=== Scan Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Logs: {} parsed, {} from cache, {} skipped, {} failed",
            self.logs_parsed.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
            self.logs_skipped.load(Ordering::Relaxed),
            self.logs_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total parse time: {:.2}s (avg: {:.2}ms per log)",
            self.total_parse_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_parse_time_ms()
        );
        tracing::info!(
            "Retries: {}, circuit breaker rejections: {}",
            retries,
            self.breaker_rejections.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
