use super::segments::{SegmentExtractor, index};
use super::{CrashLog, SettingValue};
use crate::cancellation::CancellationToken;
use crate::error::{ScanError, ScanResult};
use camino::Utf8Path;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use std::io;
use thiserror::Error;

/// Anything shorter is not treated as a crash log
pub const MIN_CRASH_LOG_LINES: usize = 20;

const GAME_PREFIXES: [&str; 2] = ["Fallout", "Skyrim"];
const CRASHGEN_PREFIXES: [&str; 2] = ["Buffout", "Crash Logger"];
const MAIN_ERROR_PREFIX: &str = "Unhandled exception";

/// Why a file could not be turned into a [`CrashLog`]
#[derive(Error, Debug)]
pub enum CrashLogError {
    #[error("Not a crash log: only {lines} lines (need at least {MIN_CRASH_LOG_LINES})")]
    TooShort { lines: usize },

    #[error("Failed to read crash log: {0}")]
    Io(#[from] io::Error),

    #[error("Crash log parsing cancelled")]
    Cancelled,
}

impl From<CrashLogError> for ScanError {
    fn from(err: CrashLogError) -> Self {
        match err {
            CrashLogError::Io(e) => ScanError::Io(e),
            CrashLogError::Cancelled => ScanError::cancelled_during("parse crash log"),
            other @ CrashLogError::TooShort { .. } => ScanError::Other(other.into()),
        }
    }
}

/// Parser for Buffout 4 / Crash Logger crash logs
///
/// # Fields
///
/// Patterns are compiled once at construction:
///
/// - `plugin_pattern`: load order token plus plugin name
///   - Pattern: `\[([0-9A-Fa-f]{2}):([0-9A-Fa-f]{3})\]\s+(.+)`
///   - Example match: "\[FE:001\]   MyMod.esp"
///
/// - `module_pattern`: script extender DLL with optional version
///   - Pattern: `(?i)^(.+?\.dll)(?:\s+v.*)?$`
///   - Example match: "Buffout4.dll v1.26.2"
#[derive(Debug, Clone)]
pub struct CrashLogParser {
    plugin_pattern: Regex,
    module_pattern: Regex,
}

impl CrashLogParser {
    pub fn new() -> Self {
        Self {
            plugin_pattern: Regex::new(r"\[([0-9A-Fa-f]{2}):([0-9A-Fa-f]{3})\]\s+(.+)")
                .expect("Invalid plugin regex"),
            module_pattern: Regex::new(r"(?i)^(.+?\.dll)(?:\s+v.*)?$")
                .expect("Invalid module regex"),
        }
    }

    /// Parse a crash log, failing closed.
    ///
    /// Every failure except cancellation becomes `Ok(None)`; cancellation is
    /// returned as an error so batch callers can stop.
    pub async fn parse_file(
        &self,
        path: &Utf8Path,
        token: &CancellationToken,
    ) -> ScanResult<Option<CrashLog>> {
        match self.try_parse_file(path, token).await {
            Ok(log) => Ok(Some(log)),
            Err(CrashLogError::Cancelled) => {
                Err(ScanError::cancelled_during(format!("parse {path}")))
            }
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Parse a crash log, distinguishing "not a crash log", I/O failure and
    /// cancellation.
    pub async fn try_parse_file(
        &self,
        path: &Utf8Path,
        token: &CancellationToken,
    ) -> Result<CrashLog, CrashLogError> {
        if token.is_cancelled() {
            return Err(CrashLogError::Cancelled);
        }

        let bytes = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CrashLogError::Cancelled),
            read = tokio::fs::read(path) => read?,
        };

        // Crash logs are not guaranteed to be valid UTF-8
        let lines: Vec<String> = String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect();

        self.parse_lines(path.as_str(), lines)
    }

    /// Parse already-read lines
    pub fn parse_lines(
        &self,
        file_path: &str,
        lines: Vec<String>,
    ) -> Result<CrashLog, CrashLogError> {
        if lines.len() < MIN_CRASH_LOG_LINES {
            return Err(CrashLogError::TooShort { lines: lines.len() });
        }

        let mut log = CrashLog {
            file_path: file_path.to_string(),
            ..Default::default()
        };
        self.parse_header(&lines, &mut log);

        let mut segments = SegmentExtractor::extract_from(&lines);

        log.crashgen_settings = parse_crashgen_settings(&segments[index::CRASHGEN_SETTINGS]);
        log.call_stack = std::mem::take(&mut segments[index::CALL_STACK]);
        log.xse_modules = self.parse_xse_modules(&segments[index::XSE_MODULES]);
        log.plugins = self.parse_plugins(&segments[index::PLUGINS]);
        log.is_incomplete = log.plugins.is_empty();
        log.original_lines = lines;

        tracing::debug!(
            "Parsed {} - plugins: {}, modules: {}, settings: {}, incomplete: {}",
            file_path,
            log.plugins.len(),
            log.xse_modules.len(),
            log.crashgen_settings.len(),
            log.is_incomplete
        );

        Ok(log)
    }

    /// First matching line wins for each header field. Matching is done on the
    /// raw line so indented module lines like `Fallout4.exe` never qualify.
    fn parse_header(&self, lines: &[String], log: &mut CrashLog) {
        for line in lines {
            if log.game_version.is_none() && GAME_PREFIXES.iter().any(|p| line.starts_with(p)) {
                log.game_version = Some(line.trim().to_string());
            } else if log.crash_gen_version.is_none()
                && CRASHGEN_PREFIXES.iter().any(|p| line.starts_with(p))
            {
                log.crash_gen_version = Some(line.trim().to_string());
            } else if log.main_error.is_none() && line.starts_with(MAIN_ERROR_PREFIX) {
                log.main_error = Some(line.trim().replacen('|', "\n", 1));
            }

            if log.game_version.is_some()
                && log.crash_gen_version.is_some()
                && log.main_error.is_some()
            {
                break;
            }
        }
    }

    fn parse_xse_modules(&self, segment: &[String]) -> IndexSet<String> {
        segment
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(|line| match self.module_pattern.captures(line) {
                Some(caps) => caps[1].to_lowercase(),
                None => line.to_lowercase(),
            })
            .collect()
    }

    fn parse_plugins(&self, segment: &[String]) -> IndexMap<String, String> {
        let mut plugins = IndexMap::new();
        for line in segment {
            if let Some(caps) = self.plugin_pattern.captures(line) {
                let name = caps[3].trim().to_string();
                plugins.insert(name, format!("{}:{}", &caps[1], &caps[2]));
            }
        }
        plugins
    }
}

impl Default for CrashLogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `Key: value` lines; `[Section]` headers are skipped and the last duplicate wins
fn parse_crashgen_settings(segment: &[String]) -> IndexMap<String, SettingValue> {
    let mut settings = IndexMap::new();
    for line in segment {
        let line = line.trim();
        if line.is_empty() || line.starts_with('[') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            settings.insert(key.trim().to_string(), SettingValue::coerce(value.trim()));
        }
    }
    settings
}
