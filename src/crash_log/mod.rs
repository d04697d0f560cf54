//! Crash log ingestion.
//!
//! Buffout 4 (Fallout 4) and Crash Logger (Skyrim) write plain-text crash logs
//! made of a few header lines followed by marker-delimited sections:
//!
//! ```text
//! Fallout 4 v1.10.163
//! Buffout 4 v1.26.2
//!
//! Unhandled exception "EXCEPTION_ACCESS_VIOLATION" at 0x7FF6D2A5B1C3
//!
//! [Compatibility]
//!     F4EE: true
//! SYSTEM SPECS:
//!     OS: Microsoft Windows 11 Pro v10.0.22631
//! PROBABLE CALL STACK:
//!     [0] 0x7FF6D2A5B1C3 Fallout4.exe+0B6B1C3
//! MODULES:
//!     Fallout4.exe  0x7FF6C7D70000
//! F4SE PLUGINS:
//!     Buffout4.dll v1.26.2
//! PLUGINS:
//!     [00]     Fallout4.esm
//!     [FE:001] MyMod.esp
//! ```
//!
//! - [`segments`] splits the lines into the six sections
//! - [`parser`] turns the header and sections into a [`CrashLog`]

pub mod parser;
pub mod segments;

pub use parser::{CrashLogError, CrashLogParser, MIN_CRASH_LOG_LINES};
pub use segments::{SegmentExtractor, Segments, XseFlavor, SEGMENT_COUNT};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed value of a crash generator setting (`Key: value` lines)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SettingValue {
    /// Coerce a raw value: booleans first (case-insensitive), then integers,
    /// otherwise the string as-is
    pub fn coerce(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(value) = raw.parse::<i64>() {
            Self::Int(value)
        } else {
            Self::Str(raw.to_string())
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Structured view of one crash log file.
///
/// Built once by [`CrashLogParser`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CrashLog {
    pub file_path: String,
    pub original_lines: Vec<String>,

    pub game_version: Option<String>,
    pub crash_gen_version: Option<String>,
    pub main_error: Option<String>,

    pub call_stack: Vec<String>,
    pub crashgen_settings: IndexMap<String, SettingValue>,

    /// Lower-cased script extender plugin file names
    pub xse_modules: IndexSet<String>,

    /// Plugin file name -> load order token (e.g. `FE:001`)
    pub plugins: IndexMap<String, String>,

    /// No plugins could be extracted
    pub is_incomplete: bool,
}

impl CrashLog {
    /// File name portion of [`Self::file_path`]
    pub fn file_name(&self) -> &str {
        camino::Utf8Path::new(&self.file_path)
            .file_name()
            .unwrap_or(&self.file_path)
    }

    pub fn has_plugin(&self, plugin: &str) -> bool {
        self.plugins.keys().any(|p| p.eq_ignore_ascii_case(plugin))
    }

    pub fn has_xse_module(&self, module: &str) -> bool {
        self.xse_modules.contains(&module.to_lowercase())
    }

    pub fn setting(&self, key: &str) -> Option<&SettingValue> {
        self.crashgen_settings.get(key)
    }
}
