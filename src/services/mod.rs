//! Services module - batch scanning built on the core components.
//!
//! - [`ScanService`]: runs a batch of crash logs through the resource manager,
//!   analysis cache, resilient executor and circuit breaker, and reports
//!   per-file [`FileOutcome`]s in a [`ScanReport`]
//! - [`discover_crash_logs`]: finds `crash-*.log` files in a directory
//! - [`Game`]: identifies the game a parsed log came from
//!
//! # Usage Example
//!
//! ```ignore
//! use classic::cache::MemoryCacheManager;
//! use classic::cancellation::CancellationTokenSource;
//! use classic::services::ScanService;
//!
//! let service = Arc::new(ScanService::from_settings(
//!     Arc::new(MemoryCacheManager::default()),
//!     &settings,
//! ));
//! let source = CancellationTokenSource::new();
//! let report = service.scan_logs(paths, &source.token(), None).await?;
//! ```

pub mod game_detection;
pub mod scanning;

pub use game_detection::Game;
pub use scanning::{
    CRASH_LOG_ANALYZER, FileOutcome, FileResult, ScanReport, ScanService, discover_crash_logs,
};
