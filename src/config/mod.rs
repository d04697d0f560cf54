use crate::cache::{CacheManager, Cacheable};
use crate::models::ScanSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

/// Name of the settings file inside the configuration directory
pub const SETTINGS_FILE: &str = "CLASSIC Settings.yaml";

/// Prefix of environment variables that override settings,
/// e.g. `CLASSIC_CACHE__ENABLED=false`
pub const ENV_PREFIX: &str = "CLASSIC";

/// Loads and saves scanner settings and reads values out of YAML data files.
///
/// Settings are layered: serde defaults, then `CLASSIC Settings.yaml` (optional),
/// then `CLASSIC_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    env_source: Option<HashMap<String, String>>,
    yaml_ttl: Option<Duration>,
}

impl ConfigManager {
    /// Create a ConfigManager rooted at `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
            env_source: None,
            yaml_ttl: None,
        })
    }

    /// Read overrides from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Expiration for values served by [`yaml_setting`](Self::yaml_setting)
    pub fn with_yaml_ttl(mut self, ttl: Duration) -> Self {
        self.yaml_ttl = Some(ttl);
        self
    }

    /// Load the layered settings. A missing settings file is not an error.
    pub fn load_settings(&self) -> Result<ScanSettings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(self.env_source.clone());

        let settings: ScanSettings = Config::builder()
            .add_source(File::new(self.settings_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Write `settings` to the settings file.
    pub fn save_settings(&self, settings: &ScanSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Change one setting by dotted key and persist the result.
    ///
    /// Only the file layer is rewritten; environment overrides stay in effect
    /// but are not baked into the file.
    pub fn save_setting(&self, key: &str, value: &str) -> Result<ScanSettings> {
        let mut settings = self.load_file_settings()?;
        settings
            .apply(key, value)
            .with_context(|| format!("Failed to update setting '{}'", key))?;
        self.save_settings(&settings)?;
        tracing::info!("Setting '{}' changed to '{}'", key, value);
        Ok(settings)
    }

    /// Value at dotted `key_path` inside the YAML file `yaml_file` (relative to
    /// the configuration directory), served from `cache` when possible.
    ///
    /// Missing files, missing keys and type mismatches all yield `None`, and
    /// that `None` is cached like any other value.
    pub fn yaml_setting<T, C>(&self, cache: &C, yaml_file: &str, key_path: &str) -> Option<T>
    where
        T: Cacheable + DeserializeOwned,
        C: CacheManager,
    {
        let path = self.config_dir.join(yaml_file);
        cache.get_or_set_yaml_setting(
            path.as_str(),
            key_path,
            || read_yaml_key(&path, key_path),
            self.yaml_ttl,
        )
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    fn load_file_settings(&self) -> Result<ScanSettings> {
        if !self.settings_path.exists() {
            return Ok(ScanSettings::default());
        }
        let contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;
        serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))
    }
}

fn read_yaml_key<T: DeserializeOwned>(path: &Utf8Path, key_path: &str) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::debug!("Cannot read YAML file {}: {}", path, e);
            return None;
        }
    };

    let root: serde_yaml_ng::Value = match serde_yaml_ng::from_str(&contents) {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!("Invalid YAML in {}: {}", path, e);
            return None;
        }
    };

    let mut node = &root;
    for part in key_path.split('.') {
        node = node.get(part)?;
    }

    serde_yaml_ng::from_value(node.clone())
        .inspect_err(|e| tracing::debug!("Setting {} in {} has unexpected type: {}", key_path, path, e))
        .ok()
}
