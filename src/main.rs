//! CLASSIC - Crash Log Auto Scanner
//!
//! Command line entry point. It initializes:
//! - Logging (daily rotating file plus console)
//! - Tokio multi-thread runtime
//! - Settings ([`ConfigManager`]) with command line overrides
//! - The scan pipeline ([`ScanService`]) and scan state ([`ScanStateManager`])
//!
//! # Execution Flow
//!
//! 1. Parse arguments and initialize logging → `logs/classic.<date>`
//! 2. Load `CLASSIC Settings.yaml` (+ `CLASSIC_*` environment overrides)
//! 3. Expand directories into `crash-*.log` files
//! 4. Scan all logs concurrently; Ctrl-C cancels the batch
//! 5. Print one summary per log and the batch tally

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use classic::cache::{CacheManager, MemoryCacheManager, NullCacheManager};
use classic::cancellation::CancellationTokenSource;
use classic::fs::StdFileSystem;
use classic::logging::{LogOptions, setup_logging_with_options};
use classic::services::{FileOutcome, Game, ScanReport, ScanService, discover_crash_logs};
use classic::{APP_NAME, ConfigManager, ScanSettings, ScanStateManager, StateChange, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Crash Log Auto Scanner for Buffout 4 / Crash Logger crash logs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Crash log files, or directories to search for crash-*.log files
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<Utf8PathBuf>,

    /// Directory holding CLASSIC Settings.yaml
    #[arg(long, value_name = "DIR", default_value = "CLASSIC Data")]
    config_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, value_name = "DIR", default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Write the file log as JSON lines
    #[arg(long)]
    json_log: bool,

    /// Disable the analysis cache
    #[arg(long)]
    no_cache: bool,

    /// Fixed number of concurrent scans (disables adaptive scaling)
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// Per-file parse timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Persist a setting before scanning, e.g. --set cache.enabled=false
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = setup_logging_with_options(
        &cli.log_dir,
        "classic",
        LogOptions {
            debug: cli.debug,
            console: true,
            json: cli.json_log,
        },
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    for assignment in &cli.set {
        let (key, value) = assignment
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got '{}'", assignment))?;
        config_manager.save_setting(key.trim(), value.trim())?;
    }

    let mut settings = config_manager.load_settings()?;
    let config_manager = config_manager.with_yaml_ttl(settings.yaml_ttl());
    if let Some(jobs) = cli.jobs {
        settings.scan.jobs = jobs;
    }
    if let Some(timeout) = cli.timeout {
        settings.scan.timeout_secs = timeout;
    }
    if cli.no_cache {
        settings.cache.enabled = false;
    }

    let paths = collect_paths(&cli.paths, &settings.scan.crash_log_prefix)?;
    if paths.is_empty() {
        println!("No crash logs found.");
        return Ok(ExitCode::SUCCESS);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("classic-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let report = if settings.cache.enabled {
        let cache = MemoryCacheManager::new(Arc::new(StdFileSystem))
            .with_analysis_ttl(settings.analysis_ttl());
        runtime.block_on(run_scan(cache, &config_manager, &settings, paths))
    } else {
        runtime.block_on(run_scan(NullCacheManager, &config_manager, &settings, paths))
    };

    runtime.shutdown_timeout(Duration::from_secs(5));

    match report {
        Ok(report) => {
            print_report(&report);
            let (_, _, failed) = report.counts();
            tracing::info!("Application shutdown complete");
            Ok(if failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) if e.is_cancelled() => {
            println!("Scan cancelled.");
            Ok(ExitCode::from(130))
        }
        Err(e) => Err(e).context("Scan failed"),
    }
}

async fn run_scan<C: CacheManager + 'static>(
    cache: C,
    config_manager: &ConfigManager,
    settings: &ScanSettings,
    paths: Vec<Utf8PathBuf>,
) -> classic::ScanResult<ScanReport> {
    if let Some(version) =
        config_manager.yaml_setting::<String, _>(&cache, "CLASSIC Main.yaml", "CLASSIC_Info.version")
    {
        tracing::info!("Using CLASSIC data {}", version);
    }

    let service = Arc::new(ScanService::from_settings(Arc::new(cache), settings));
    let state = ScanStateManager::new();

    let source = Arc::new(CancellationTokenSource::new());
    let ctrl_c = {
        let source = Arc::clone(&source);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl-C received, cancelling scan");
                source.cancel();
            }
        })
    };

    let mut events = state.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            let change = match events.recv().await {
                Ok(change) => change,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match change {
                StateChange::ProgressUpdated {
                    current,
                    total,
                    current_log: Some(log),
                } => {
                    let name = Utf8Path::new(&log).file_name().unwrap_or(&log).to_string();
                    eprintln!("[{}/{}] {}", current, total, name);
                }
                StateChange::ScanFinished { .. } => break,
                _ => {}
            }
        }
    });

    let result = service.scan_logs(paths, &source.token(), Some(&state)).await;

    ctrl_c.abort();
    // Closing the channel ends the printer even if no ScanFinished was sent
    drop(state);
    let _ = printer.await;
    service.shutdown();
    source.dispose();

    result
}

fn collect_paths(inputs: &[Utf8PathBuf], prefix: &str) -> Result<Vec<Utf8PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = discover_crash_logs(input, prefix)
                .with_context(|| format!("Failed to list crash logs in {}", input))?;
            tracing::info!("Found {} crash logs in {}", found.len(), input);
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }
    Ok(paths)
}

fn print_report(report: &ScanReport) {
    for result in &report.results {
        println!("{}", result.path);
        match &result.outcome {
            FileOutcome::Succeeded(log) => {
                let game = Game::from_crash_log(log)
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "Unknown game".to_string());
                println!("  Game:          {}", game);
                println!(
                    "  Crash logger:  {}",
                    log.crash_gen_version.as_deref().unwrap_or("unknown")
                );
                if let Some(error) = &log.main_error {
                    println!("  Main error:    {}", error.replace('\n', " | "));
                }
                println!(
                    "  Plugins: {}, XSE modules: {}, call stack lines: {}",
                    log.plugins.len(),
                    log.xse_modules.len(),
                    log.call_stack.len()
                );
                if log.is_incomplete {
                    println!("  WARNING: no plugin list found, log is incomplete");
                }
                if result.from_cache {
                    println!("  (from cache)");
                }
            }
            FileOutcome::Skipped(reason) => println!("  Skipped: {}", reason),
            FileOutcome::Failed(reason) => println!("  FAILED: {}", reason),
        }
    }

    let (succeeded, skipped, failed) = report.counts();
    println!();
    println!(
        "Scanned {} logs in {:.2}s: {} succeeded, {} skipped, {} failed",
        report.results.len(),
        report.elapsed.as_secs_f64(),
        succeeded,
        skipped,
        failed
    );
    println!("Cache: {}", report.cache_statistics.summary());
}
