use crate::resilience::{CircuitBreaker, DefaultErrorPolicy};
use crate::resources::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Scanner settings loaded from `CLASSIC Settings.yaml`.
///
/// Every field has a serde default, so a partial file (or none at all) yields a
/// usable configuration. Zero means "pick automatically" for the counts below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScanSettings {
    pub scan: ScanSection,
    pub cache: CacheSection,
    pub resilience: ResilienceSection,
    pub resources: ResourcesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Fixed concurrency; 0 lets the resource manager adapt
    pub jobs: usize,
    /// Per-file parse timeout in seconds; 0 disables it
    pub timeout_secs: u64,
    /// Filename prefix that marks a crash log in a directory
    pub crash_log_prefix: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            jobs: 0,
            timeout_secs: 0,
            crash_log_prefix: "crash-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub yaml_ttl_secs: u64,
    pub analysis_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            yaml_ttl_secs: 30 * 60,
            analysis_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_timeout_secs: u64,
}

impl Default for ResilienceSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            breaker_threshold: 5,
            breaker_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesSection {
    /// Upper bound for the adaptive limit; 0 uses `max(cpus * 2, 4)`
    pub max_limit: usize,
    pub sample_interval_secs: u64,
}

impl Default for ResourcesSection {
    fn default() -> Self {
        Self {
            max_limit: 0,
            sample_interval_secs: 5,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for setting '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

type Setter = fn(&mut ScanSettings, &str) -> Result<(), SettingsError>;

/// Every settable key. Adding a field to a section means adding a row here.
static SETTERS: &[(&str, Setter)] = &[
    ("scan.jobs", |s, v| {
        s.scan.jobs = parse_value("scan.jobs", v)?;
        Ok(())
    }),
    ("scan.timeout_secs", |s, v| {
        s.scan.timeout_secs = parse_value("scan.timeout_secs", v)?;
        Ok(())
    }),
    ("scan.crash_log_prefix", |s, v| {
        s.scan.crash_log_prefix = v.to_string();
        Ok(())
    }),
    ("cache.enabled", |s, v| {
        s.cache.enabled = parse_value("cache.enabled", v)?;
        Ok(())
    }),
    ("cache.yaml_ttl_secs", |s, v| {
        s.cache.yaml_ttl_secs = parse_value("cache.yaml_ttl_secs", v)?;
        Ok(())
    }),
    ("cache.analysis_ttl_secs", |s, v| {
        s.cache.analysis_ttl_secs = parse_value("cache.analysis_ttl_secs", v)?;
        Ok(())
    }),
    ("resilience.max_retries", |s, v| {
        s.resilience.max_retries = parse_value("resilience.max_retries", v)?;
        Ok(())
    }),
    ("resilience.base_delay_ms", |s, v| {
        s.resilience.base_delay_ms = parse_value("resilience.base_delay_ms", v)?;
        Ok(())
    }),
    ("resilience.breaker_threshold", |s, v| {
        s.resilience.breaker_threshold = parse_value("resilience.breaker_threshold", v)?;
        Ok(())
    }),
    ("resilience.breaker_timeout_secs", |s, v| {
        s.resilience.breaker_timeout_secs = parse_value("resilience.breaker_timeout_secs", v)?;
        Ok(())
    }),
    ("resources.max_limit", |s, v| {
        s.resources.max_limit = parse_value("resources.max_limit", v)?;
        Ok(())
    }),
    ("resources.sample_interval_secs", |s, v| {
        s.resources.sample_interval_secs = parse_value("resources.sample_interval_secs", v)?;
        Ok(())
    }),
];

fn parse_value<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

impl ScanSettings {
    /// Set one field by its dotted key, e.g. `apply("cache.enabled", "false")`
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let (_, setter) = SETTERS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        setter(self, value)
    }

    /// Dotted keys accepted by [`apply`](Self::apply)
    pub fn keys() -> impl Iterator<Item = &'static str> {
        SETTERS.iter().map(|(name, _)| *name)
    }

    pub fn error_policy(&self) -> DefaultErrorPolicy {
        DefaultErrorPolicy::new(
            self.resilience.max_retries,
            Duration::from_millis(self.resilience.base_delay_ms),
        )
    }

    pub fn circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.resilience.breaker_threshold,
            Duration::from_secs(self.resilience.breaker_timeout_secs),
        )
    }

    /// Resource limits with auto values resolved. A fixed `scan.jobs` pins both
    /// the initial and the maximum limit.
    pub fn resource_limits(&self) -> ResourceLimits {
        let mut limits = ResourceLimits::default();
        if self.resources.max_limit > 0 {
            limits.max_limit = self.resources.max_limit;
            limits.initial_limit = limits.initial_limit.min(limits.max_limit);
        }
        if self.scan.jobs > 0 {
            limits.initial_limit = self.scan.jobs;
            limits.max_limit = self.scan.jobs;
        }
        limits.sample_interval = Duration::from_secs(self.resources.sample_interval_secs.max(1));
        limits
    }

    pub fn file_timeout(&self) -> Option<Duration> {
        (self.scan.timeout_secs > 0).then(|| Duration::from_secs(self.scan.timeout_secs))
    }

    pub fn yaml_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.yaml_ttl_secs)
    }

    pub fn analysis_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.analysis_ttl_secs)
    }
}
