//! Caching for derived settings and per-file analysis results.
//!
//! Two cache families share one store:
//!
//! - YAML settings: cache-aside with an absolute expiration, keyed by
//!   `yaml:<file>:<key path>`
//! - Analysis results: keyed by `analysis:<path>:<analyzer>` and guarded by the
//!   file's modification time recorded under `filetime:<path>`. A file that
//!   changed (or vanished) since the result was stored invalidates the entry on
//!   the next read.
//!
//! [`MemoryCacheManager`] is the real implementation; [`NullCacheManager`]
//! always misses so caching can be switched off without touching call sites.

pub mod memory;
pub mod null;

pub use memory::MemoryCacheManager;
pub use null::NullCacheManager;

use camino::Utf8Path;
use serde::Serialize;
use std::time::Duration;

/// Expiration applied to YAML settings when the caller gives none
pub const DEFAULT_YAML_TTL: Duration = Duration::from_secs(30 * 60);

/// Expiration applied to analysis results when none is configured
pub const DEFAULT_ANALYSIS_TTL: Duration = Duration::from_secs(60 * 60);

/// Values that can be stored in a cache
pub trait Cacheable: Clone + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + 'static {}

/// Aggregate cache counters, consumed by diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub total_hits: u64,
    pub total_misses: u64,
    /// Hits over requests; 0.0 when nothing was requested
    pub hit_rate: f64,
    pub cached_entries: usize,
    pub tracked_files: usize,
    /// Rough estimate of the bytes held by the store
    pub memory_usage_bytes: usize,
}

impl CacheStatistics {
    pub fn total_requests(&self) -> u64 {
        self.total_hits + self.total_misses
    }

    pub fn summary(&self) -> String {
        format!(
            "{} hits, {} misses ({:.1}% hit rate), {} entries, {} tracked files, ~{} KiB",
            self.total_hits,
            self.total_misses,
            self.hit_rate * 100.0,
            self.cached_entries,
            self.tracked_files,
            self.memory_usage_bytes / 1024
        )
    }
}

/// Cache operations used by the scanning pipeline
pub trait CacheManager: Send + Sync {
    /// Return the cached setting, or run `factory` and cache whatever it
    /// returns (including `None`) for `ttl` (default [`DEFAULT_YAML_TTL`]).
    fn get_or_set_yaml_setting<T, F>(
        &self,
        yaml_file: &str,
        key_path: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Option<T>
    where
        T: Cacheable,
        F: FnOnce() -> Option<T>;

    /// Store `result` for `path`, remembering the file's current modification time.
    /// Failures are logged, never raised.
    fn cache_analysis_result<T: Cacheable>(&self, path: &Utf8Path, analyzer: &str, result: T);

    /// Cached result for `path`, unless the file changed since it was stored
    fn get_cached_analysis_result<T: Cacheable>(&self, path: &Utf8Path, analyzer: &str)
    -> Option<T>;

    fn statistics(&self) -> CacheStatistics;

    /// Drop every value, counter and tracked modification time
    fn clear_cache(&self);

    /// Remove expired values and their per-key counters; returns how many
    /// values were dropped. Totals in [`statistics`](Self::statistics) are kept.
    fn evict_expired(&self) -> usize {
        0
    }
}

pub(crate) fn yaml_key(yaml_file: &str, key_path: &str) -> String {
    format!("yaml:{yaml_file}:{key_path}")
}

pub(crate) fn analysis_key(path: &Utf8Path, analyzer: &str) -> String {
    format!("analysis:{path}:{analyzer}")
}

pub(crate) fn filetime_key(path: &Utf8Path) -> String {
    format!("filetime:{path}")
}
