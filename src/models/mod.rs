//! Data models shared across the scanner.
//!
//! - [`ScanSettings`]: user settings loaded from `CLASSIC Settings.yaml`, with a
//!   key table for setting individual values
//! - [`ScanState`]: runtime state of a scan batch, owned by
//!   [`ScanStateManager`](crate::state::ScanStateManager)
//!
//! The parsed crash log itself lives in [`crate::crash_log`].

pub mod scan_state;
pub mod settings;

pub use scan_state::{LogStatus, ScanProgress, ScanState};
pub use settings::{
    CacheSection, ResilienceSection, ResourcesSection, ScanSection, ScanSettings, SettingsError,
};
