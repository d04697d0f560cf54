use crate::cache::{CacheManager, CacheStatistics};
use crate::cancellation::{
    CancellationAwareProgress, CancellationToken, CancellationTokenSource, Progress, checkpoint,
};
use crate::crash_log::{CrashLog, CrashLogError, CrashLogParser};
use crate::error::{ScanError, ScanResult};
use crate::metrics::Metrics;
use crate::models::{LogStatus, ScanProgress, ScanSettings};
use crate::resilience::{CircuitBreaker, ResilientExecutor};
use crate::resources::ResourceManager;
use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinSet};

/// Analyzer name under which parsed crash logs are cached
pub const CRASH_LOG_ANALYZER: &str = "crash_log_parser";

/// What happened to one file
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Succeeded(Arc<CrashLog>),
    /// Not a crash log, or given up on after recoverable errors
    Skipped(String),
    Failed(String),
}

impl FileOutcome {
    pub fn status(&self) -> LogStatus {
        match self {
            Self::Succeeded(_) => LogStatus::Succeeded,
            Self::Skipped(_) => LogStatus::Skipped,
            Self::Failed(_) => LogStatus::Failed,
        }
    }

    pub fn crash_log(&self) -> Option<&CrashLog> {
        match self {
            Self::Succeeded(log) => Some(log),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: Utf8PathBuf,
    pub outcome: FileOutcome,
    pub from_cache: bool,
}

impl FileResult {
    fn new(path: Utf8PathBuf, outcome: FileOutcome) -> Self {
        Self {
            path,
            outcome,
            from_cache: false,
        }
    }

    fn message(&self) -> String {
        match &self.outcome {
            FileOutcome::Succeeded(log) => {
                let source = if self.from_cache { " (cached)" } else { "" };
                format!(
                    "{} plugins, {} modules{}",
                    log.plugins.len(),
                    log.xse_modules.len(),
                    source
                )
            }
            FileOutcome::Skipped(reason) | FileOutcome::Failed(reason) => reason.clone(),
        }
    }
}

/// Results of one batch, in input order
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub results: Vec<FileResult>,
    pub elapsed: Duration,
    pub cache_statistics: CacheStatistics,
}

impl ScanReport {
    /// (succeeded, skipped, failed)
    pub fn counts(&self) -> (usize, usize, usize) {
        self.results
            .iter()
            .fold((0, 0, 0), |(ok, skip, fail), result| match result.outcome {
                FileOutcome::Succeeded(_) => (ok + 1, skip, fail),
                FileOutcome::Skipped(_) => (ok, skip + 1, fail),
                FileOutcome::Failed(_) => (ok, skip, fail + 1),
            })
    }

    pub fn crash_logs(&self) -> impl Iterator<Item = &CrashLog> {
        self.results.iter().filter_map(|r| r.outcome.crash_log())
    }
}

enum ParseOutcome {
    Parsed(CrashLog),
    NotACrashLog(String),
}

/// Batch crash-log scanner.
///
/// Every file runs as its own task:
/// 1. wait for a [`ResourceManager`] slot (or cancellation)
/// 2. serve the analysis cache if the file is unchanged
/// 3. otherwise parse through `executor(breaker(parse))`
///
/// Recoverable failures are recorded per file and the batch continues.
/// Cancellation and out-of-memory stop every remaining task and are returned
/// as the batch error.
pub struct ScanService<C> {
    parser: CrashLogParser,
    cache: Arc<C>,
    executor: ResilientExecutor,
    breaker: CircuitBreaker,
    resources: ResourceManager,
    metrics: Metrics,
    file_timeout: Option<Duration>,
}

impl<C: CacheManager + 'static> ScanService<C> {
    pub fn new(
        cache: Arc<C>,
        executor: ResilientExecutor,
        breaker: CircuitBreaker,
        resources: ResourceManager,
    ) -> Self {
        Self {
            parser: CrashLogParser::new(),
            cache,
            executor,
            breaker,
            resources,
            metrics: Metrics::new(),
            file_timeout: None,
        }
    }

    /// Service wired from settings, with the load monitor running.
    /// Must be called inside a tokio runtime.
    pub fn from_settings(cache: Arc<C>, settings: &ScanSettings) -> Self {
        let resources = ResourceManager::start(settings.resource_limits());
        Self::new(
            cache,
            ResilientExecutor::new(settings.error_policy()),
            settings.circuit_breaker(),
            resources,
        )
        .with_file_timeout(settings.file_timeout())
    }

    /// Give up on a single file after `timeout`; the attempt counts as a
    /// transient failure
    pub fn with_file_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.file_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Stop the load monitor. Later scans fail every file with
    /// [`ScanError::Disposed`].
    pub fn shutdown(&self) {
        self.resources.dispose();
        self.metrics.log_summary(self.executor.retry_count());
    }

    /// Find crash logs in `dir` and scan them
    pub async fn scan_directory(
        self: &Arc<Self>,
        dir: &Utf8Path,
        prefix: &str,
        token: &CancellationToken,
        progress: Option<&dyn Progress<ScanProgress>>,
    ) -> ScanResult<ScanReport> {
        let paths = discover_crash_logs(dir, prefix)?;
        self.scan_logs(paths, token, progress).await
    }

    pub async fn scan_logs(
        self: &Arc<Self>,
        paths: Vec<Utf8PathBuf>,
        token: &CancellationToken,
        progress: Option<&dyn Progress<ScanProgress>>,
    ) -> ScanResult<ScanReport> {
        let started = Instant::now();
        let progress = progress.map(CancellationAwareProgress::new);
        let report = |event: ScanProgress| {
            if let Some(sink) = &progress {
                if let Err(e) = sink.report(event) {
                    tracing::debug!("Progress sink rejected report: {}", e);
                }
            }
        };

        token.check(Some("start scan"))?;

        let total = paths.len();
        tracing::info!(
            "Scanning {} crash logs (concurrency limit: {})",
            total,
            self.resources.current_limit()
        );
        report(ScanProgress::Started { total });

        let evicted = self.cache.evict_expired();
        if evicted > 0 {
            tracing::debug!("Dropped {} expired cache entries before scan", evicted);
        }

        // Tasks watch a child token so a fatal error can stop the rest
        let batch = CancellationTokenSource::linked(token);
        let mut tasks = JoinSet::new();

        let mut pending: HashMap<task::Id, (usize, Utf8PathBuf)> = HashMap::with_capacity(total);

        for (index, path) in paths.into_iter().enumerate() {
            let service = Arc::clone(self);
            let task_token = batch.token();
            let task_path = path.clone();
            let handle = tasks.spawn(async move { service.scan_one(&task_path, &task_token).await });
            pending.insert(handle.id(), (index, path));
        }

        let mut slots: Vec<Option<FileResult>> = (0..total).map(|_| None).collect();
        let mut fatal: Option<ScanError> = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, joined) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(e) => (e.id(), Err(e)),
            };
            let Some((index, path)) = pending.remove(&id) else {
                continue;
            };
            let result = joined.unwrap_or_else(|e| {
                tracing::error!("Scan task for {} did not finish: {}", path, e);
                let reason = if e.is_panic() {
                    "Scan task panicked".to_string()
                } else {
                    format!("Scan task stopped: {e}")
                };
                Ok(FileResult::new(path.clone(), FileOutcome::Failed(reason)))
            });

            match result {
                Ok(file_result) => {
                    match &file_result.outcome {
                        FileOutcome::Succeeded(_) => {}
                        FileOutcome::Skipped(reason) => {
                            tracing::warn!("Skipped {}: {}", path, reason);
                            self.metrics.record_log_skipped();
                        }
                        FileOutcome::Failed(reason) => {
                            tracing::error!("Failed {}: {}", path, reason);
                            self.metrics.record_log_failed();
                        }
                    }
                    report(ScanProgress::LogProcessed {
                        log: path.to_string(),
                        status: file_result.outcome.status(),
                        message: file_result.message(),
                    });
                    slots[index] = Some(file_result);
                }
                Err(e) => {
                    if fatal.is_none() {
                        if e.is_cancelled() {
                            tracing::warn!("Scan cancelled at {}", path);
                        } else {
                            tracing::error!("Aborting scan after fatal error on {}: {}", path, e);
                        }
                        batch.cancel();
                        fatal = Some(e);
                    }
                }
            }
        }

        batch.dispose();
        report(ScanProgress::Finished);

        if let Some(e) = fatal {
            return Err(e);
        }

        let scan_report = ScanReport {
            results: slots.into_iter().flatten().collect(),
            elapsed: started.elapsed(),
            cache_statistics: self.cache.statistics(),
        };
        let (succeeded, skipped, failed) = scan_report.counts();
        tracing::info!(
            "Scan finished in {:.2}s: {} succeeded, {} skipped, {} failed",
            scan_report.elapsed.as_secs_f64(),
            succeeded,
            skipped,
            failed
        );
        Ok(scan_report)
    }

    /// Per-file pipeline. Only fatal errors are returned as `Err`.
    async fn scan_one(&self, path: &Utf8Path, token: &CancellationToken) -> ScanResult<FileResult> {
        let mut slot = match self.resources.acquire_slot(token).await {
            Ok(slot) => slot,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(FileResult::new(path.to_path_buf(), FileOutcome::Failed(e.to_string()))),
        };

        if let Some(log) = self
            .cache
            .get_cached_analysis_result::<Arc<CrashLog>>(path, CRASH_LOG_ANALYZER)
        {
            tracing::debug!("Analysis cache hit for {}", path);
            self.metrics.record_cache_hit();
            return Ok(FileResult {
                path: path.to_path_buf(),
                outcome: FileOutcome::Succeeded(log),
                from_cache: true,
            });
        }

        let context = format!("parse {path}");
        checkpoint(token, Some(context.as_str()), None).await?;

        let started = Instant::now();
        let last_error: Mutex<Option<String>> = Mutex::new(None);

        let result = self
            .executor
            .execute(
                || async {
                    let attempt = self.parse_guarded(path, token).await;
                    if let Err(e) = &attempt {
                        if matches!(e, ScanError::CircuitOpen) {
                            self.metrics.record_breaker_rejection();
                        }
                        *last_error.lock() = Some(e.to_string());
                    }
                    attempt
                },
                &context,
                token,
            )
            .await;
        slot.release();

        let outcome = match result {
            Ok(Some(ParseOutcome::Parsed(log))) => {
                self.metrics.record_log_parsed(started.elapsed());
                let log = Arc::new(log);
                self.cache
                    .cache_analysis_result(path, CRASH_LOG_ANALYZER, Arc::clone(&log));
                FileOutcome::Succeeded(log)
            }
            Ok(Some(ParseOutcome::NotACrashLog(reason))) => FileOutcome::Skipped(reason),
            Ok(None) => FileOutcome::Skipped(
                last_error
                    .into_inner()
                    .unwrap_or_else(|| "skipped by error policy".to_string()),
            ),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => FileOutcome::Failed(e.to_string()),
        };

        Ok(FileResult::new(path.to_path_buf(), outcome))
    }

    /// One attempt, behind the circuit breaker. "Not a crash log" is a
    /// successful outcome so it never trips the breaker or gets retried.
    /// Missing and unreadable files are left to the error policy and do not
    /// count against the breaker.
    async fn parse_guarded(&self, path: &Utf8Path, token: &CancellationToken) -> ScanResult<ParseOutcome> {
        let attempt = || async {
            let parse = self.parser.try_parse_file(path, token);
            let parsed = match self.file_timeout {
                Some(limit) => match tokio::time::timeout(limit, parse).await {
                    Ok(parsed) => parsed,
                    Err(_) => return Err(ScanError::Timeout(limit)),
                },
                None => parse.await,
            };

            match parsed {
                Ok(log) => Ok(ParseOutcome::Parsed(log)),
                Err(e @ CrashLogError::TooShort { .. }) => {
                    tracing::debug!("{} is not a crash log: {}", path, e);
                    Ok(ParseOutcome::NotACrashLog(e.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        };
        self.breaker
            .call_counting(attempt, |e| !e.is_inaccessible())
            .await
    }
}

/// Crash logs directly inside `dir`: files named `<prefix>*.log`, matched
/// case-insensitively, sorted by path.
pub fn discover_crash_logs(dir: &Utf8Path, prefix: &str) -> io::Result<Vec<Utf8PathBuf>> {
    let prefix = prefix.to_lowercase();
    let mut logs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
            tracing::debug!("Ignoring non-UTF-8 file name in {}", dir);
            continue;
        };
        let Some(name) = path.file_name().map(str::to_lowercase) else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(".log") {
            logs.push(path);
        }
    }

    logs.sort();
    tracing::debug!("Found {} crash logs in {}", logs.len(), dir);
    Ok(logs)
}
