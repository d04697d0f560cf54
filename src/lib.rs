// CLASSIC - Crash Log Auto Scanner for Bethesda games
//
// This is the library crate containing crash log parsing, caching, resilience
// and scheduling. The binary crate (main.rs) provides the command line front end.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod crash_log;
pub mod error;
pub mod fs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod resources;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use cache::{CacheManager, CacheStatistics, MemoryCacheManager, NullCacheManager};
pub use cancellation::{CancellationToken, CancellationTokenSource, Progress};
pub use config::ConfigManager;
pub use crash_log::{CrashLog, CrashLogParser, SegmentExtractor};
pub use error::{ScanError, ScanResult};
pub use models::{ScanSettings, ScanState};
pub use services::{FileOutcome, Game, ScanReport, ScanService};
pub use state::{ScanStateManager, StateChange};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
