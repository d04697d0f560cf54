use super::{
    CacheManager, CacheStatistics, Cacheable, DEFAULT_ANALYSIS_TTL, DEFAULT_YAML_TTL,
    analysis_key, filetime_key, yaml_key,
};
use crate::fs::{FileStamp, FileSystem, StdFileSystem};
use camino::Utf8Path;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
    approx_bytes: usize,
}

/// Everything behind one lock so `clear_cache` is atomic for readers
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    file_times: HashMap<String, FileStamp>,
    hits: HashMap<String, u64>,
    misses: HashMap<String, u64>,
    // Counts folded in from keys that were evicted
    retired_hits: u64,
    retired_misses: u64,
}

impl CacheState {
    fn lookup<T: Cacheable>(&mut self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            self.entries.remove(key);
            return None;
        }
        entry.value.downcast_ref::<T>().cloned()
    }

    fn insert<T: Cacheable>(&mut self, key: String, value: T, ttl: Duration) {
        let approx_bytes = key.len() + mem::size_of::<T>() + mem::size_of::<Entry>();
        self.entries.insert(
            key,
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + ttl,
                approx_bytes,
            },
        );
    }

    fn record(&mut self, key: &str, hit: bool) {
        let counters = if hit { &mut self.hits } else { &mut self.misses };
        *counters.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Drop every analysis result for `path` along with its tracked stamp
    fn invalidate_file(&mut self, path: &Utf8Path) {
        let prefix = format!("analysis:{path}:");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
        self.file_times.remove(&filetime_key(path));
    }
}

/// In-memory [`CacheManager`].
///
/// A single mutex guards values, statistics and tracked file stamps. File
/// metadata is read before the lock is taken; factories run outside it, so a
/// factory may itself use the cache.
pub struct MemoryCacheManager {
    state: Mutex<CacheState>,
    fs: Arc<dyn FileSystem>,
    analysis_ttl: Duration,
}

impl MemoryCacheManager {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            fs,
            analysis_ttl: DEFAULT_ANALYSIS_TTL,
        }
    }

    pub fn with_analysis_ttl(mut self, ttl: Duration) -> Self {
        self.analysis_ttl = ttl;
        self
    }

}

impl Default for MemoryCacheManager {
    fn default() -> Self {
        Self::new(Arc::new(StdFileSystem))
    }
}

impl CacheManager for MemoryCacheManager {
    fn get_or_set_yaml_setting<T, F>(
        &self,
        yaml_file: &str,
        key_path: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Option<T>
    where
        T: Cacheable,
        F: FnOnce() -> Option<T>,
    {
        let key = yaml_key(yaml_file, key_path);
        {
            let mut state = self.state.lock();
            if let Some(cached) = state.lookup::<Option<T>>(&key) {
                state.record(&key, true);
                return cached;
            }
            state.record(&key, false);
        }

        let value = factory();
        self.state
            .lock()
            .insert(key, value.clone(), ttl.unwrap_or(DEFAULT_YAML_TTL));
        value
    }

    fn cache_analysis_result<T: Cacheable>(&self, path: &Utf8Path, analyzer: &str, result: T) {
        let stamp = match self.fs.stamp(path) {
            Ok(stamp) => stamp,
            Err(e) => {
                tracing::warn!("Not caching {} result for {}: {}", analyzer, path, e);
                return;
            }
        };

        let mut state = self.state.lock();
        let time_key = filetime_key(path);
        if state.file_times.get(&time_key).is_some_and(|known| *known != stamp) {
            // Results from an older version of the file must not be revalidated
            state.invalidate_file(path);
        }
        state.file_times.insert(time_key, stamp);
        state.insert(analysis_key(path, analyzer), result, self.analysis_ttl);
    }

    fn get_cached_analysis_result<T: Cacheable>(
        &self,
        path: &Utf8Path,
        analyzer: &str,
    ) -> Option<T> {
        let current = self.fs.stamp(path);
        let key = analysis_key(path, analyzer);

        let mut state = self.state.lock();
        let stale = match (state.file_times.get(&filetime_key(path)), &current) {
            (Some(known), Ok(now)) => now.modified > known.modified || now.len != known.len,
            (Some(_), Err(_)) => true,
            (None, _) => false,
        };
        if stale {
            tracing::debug!("Cached results for {} are stale, invalidating", path);
            state.invalidate_file(path);
        }

        let cached = state.lookup::<T>(&key);
        state.record(&key, cached.is_some());
        cached
    }

    fn statistics(&self) -> CacheStatistics {
        let state = self.state.lock();
        let total_hits: u64 = state.hits.values().sum::<u64>() + state.retired_hits;
        let total_misses: u64 = state.misses.values().sum::<u64>() + state.retired_misses;
        let requests = total_hits + total_misses;

        let memory_usage_bytes = state
            .entries
            .values()
            .map(|entry| entry.approx_bytes)
            .sum::<usize>()
            + state
                .file_times
                .keys()
                .map(|key| key.len() + mem::size_of::<FileStamp>())
                .sum::<usize>()
            + state
                .hits
                .keys()
                .chain(state.misses.keys())
                .map(|key| key.len() + mem::size_of::<u64>())
                .sum::<usize>();

        CacheStatistics {
            total_hits,
            total_misses,
            hit_rate: if requests > 0 {
                total_hits as f64 / requests as f64
            } else {
                0.0
            },
            cached_entries: state.entries.len(),
            tracked_files: state.file_times.len(),
            memory_usage_bytes,
        }
    }

    fn clear_cache(&self) {
        *self.state.lock() = CacheState::default();
        tracing::info!("Cache cleared");
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let CacheState {
            entries,
            hits,
            misses,
            retired_hits,
            retired_misses,
            ..
        } = &mut *state;

        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let evicted = before - entries.len();

        // Counters of keys with no live value only feed the totals
        hits.retain(|key, count| {
            entries.contains_key(key) || {
                *retired_hits += *count;
                false
            }
        });
        misses.retain(|key, count| {
            entries.contains_key(key) || {
                *retired_misses += *count;
                false
            }
        });

        if evicted > 0 {
            tracing::debug!("Evicted {} expired cache entries", evicted);
        }
        evicted
    }
}
