use super::{CacheManager, CacheStatistics, Cacheable};
use camino::Utf8Path;
use std::time::Duration;

/// Cache that never stores anything.
///
/// Factories always run, reads always miss, statistics stay at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheManager;

impl CacheManager for NullCacheManager {
    fn get_or_set_yaml_setting<T, F>(
        &self,
        _yaml_file: &str,
        _key_path: &str,
        factory: F,
        _ttl: Option<Duration>,
    ) -> Option<T>
    where
        T: Cacheable,
        F: FnOnce() -> Option<T>,
    {
        factory()
    }

    fn cache_analysis_result<T: Cacheable>(&self, _path: &Utf8Path, _analyzer: &str, _result: T) {}

    fn get_cached_analysis_result<T: Cacheable>(
        &self,
        _path: &Utf8Path,
        _analyzer: &str,
    ) -> Option<T> {
        None
    }

    fn statistics(&self) -> CacheStatistics {
        CacheStatistics::default()
    }

    fn clear_cache(&self) {}
}
