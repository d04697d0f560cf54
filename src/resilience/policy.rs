use crate::error::ScanError;
use rand::Rng;
use std::fmt;
use std::io;
use std::time::Duration;

/// What the executor should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorAction {
    Continue,
    Retry,
    Skip,
    Fail,
}

/// Log level attached to a handling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Emit `message` at the matching tracing level
    pub fn log(self, message: &str) {
        match self {
            Self::Info => tracing::info!("{}", message),
            Self::Warning => tracing::warn!("{}", message),
            Self::Error => tracing::error!("{}", message),
            Self::Critical => tracing::error!(critical = true, "{}", message),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Decision produced for one failure
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorHandlingResult {
    pub action: ErrorAction,
    pub retry_delay: Option<Duration>,
    pub message: String,
    pub severity: Severity,
}

impl ErrorHandlingResult {
    fn new(action: ErrorAction, severity: Severity, message: String) -> Self {
        Self {
            action,
            retry_delay: None,
            message,
            severity,
        }
    }

    fn retry(delay: Duration, message: String) -> Self {
        Self {
            action: ErrorAction::Retry,
            retry_delay: Some(delay),
            message,
            severity: Severity::Warning,
        }
    }
}

/// Classifies failures into handling decisions
pub trait ErrorHandlingPolicy: Send + Sync {
    /// `attempt` is 1-based: the first failure of an operation is attempt 1
    fn handle_error(&self, error: &ScanError, context: &str, attempt: u32) -> ErrorHandlingResult;
}

/// Failure categories the default policy distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorCategory {
    Cancelled,
    Inaccessible,
    OutOfMemory,
    Transient,
    Unexpected,
}

fn classify(error: &ScanError) -> ErrorCategory {
    match error {
        ScanError::Cancelled { .. } => ErrorCategory::Cancelled,
        ScanError::OutOfMemory(_) => ErrorCategory::OutOfMemory,
        ScanError::Timeout(_) => ErrorCategory::Transient,
        ScanError::Io(e) => classify_io(e),
        ScanError::Other(e) => match e.downcast_ref::<io::Error>() {
            Some(io_err) => classify_io(io_err),
            None => ErrorCategory::Unexpected,
        },
        ScanError::CircuitOpen | ScanError::Disposed => ErrorCategory::Unexpected,
    }
}

fn classify_io(error: &io::Error) -> ErrorCategory {
    match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ErrorCategory::Inaccessible,
        io::ErrorKind::OutOfMemory => ErrorCategory::OutOfMemory,
        _ => ErrorCategory::Transient,
    }
}

/// Default classification with exponential backoff.
///
/// | Failure                       | Action                                   |
/// |-------------------------------|------------------------------------------|
/// | cancellation                  | `Fail` (info)                            |
/// | missing file/dir, access denied | `Skip` (warning), never retried        |
/// | out of memory                 | `Fail` (critical), never retried         |
/// | transient I/O, timeout        | `Retry` while `attempt <= max_retries`, then `Skip` |
/// | anything else                 | `Retry` while `attempt < max_retries / 2`, then `Fail` |
#[derive(Debug, Clone)]
pub struct DefaultErrorPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl DefaultErrorPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `base * 2^(attempt-1)` plus up to 10% random jitter
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.1);
        delay + delay.mul_f64(jitter)
    }
}

impl Default for DefaultErrorPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_BASE_DELAY)
    }
}

impl ErrorHandlingPolicy for DefaultErrorPolicy {
    fn handle_error(&self, error: &ScanError, context: &str, attempt: u32) -> ErrorHandlingResult {
        match classify(error) {
            ErrorCategory::Cancelled => ErrorHandlingResult::new(
                ErrorAction::Fail,
                Severity::Info,
                format!("{context}: cancelled"),
            ),
            ErrorCategory::Inaccessible => ErrorHandlingResult::new(
                ErrorAction::Skip,
                Severity::Warning,
                format!("{context}: skipping inaccessible file: {error}"),
            ),
            ErrorCategory::OutOfMemory => ErrorHandlingResult::new(
                ErrorAction::Fail,
                Severity::Critical,
                format!("{context}: out of memory: {error}"),
            ),
            ErrorCategory::Transient if attempt <= self.max_retries => {
                let delay = self.retry_delay(attempt);
                ErrorHandlingResult::retry(
                    delay,
                    format!(
                        "{context}: transient failure (attempt {attempt}/{}), retrying in {delay:?}: {error}",
                        self.max_retries
                    ),
                )
            }
            ErrorCategory::Transient => ErrorHandlingResult::new(
                ErrorAction::Skip,
                Severity::Error,
                format!("{context}: giving up after {attempt} attempts: {error}"),
            ),
            ErrorCategory::Unexpected if attempt < self.max_retries / 2 => {
                let delay = self.retry_delay(attempt);
                ErrorHandlingResult::retry(
                    delay,
                    format!("{context}: unexpected failure, retrying in {delay:?}: {error}"),
                )
            }
            ErrorCategory::Unexpected => ErrorHandlingResult::new(
                ErrorAction::Fail,
                Severity::Error,
                format!("{context}: unexpected failure: {error}"),
            ),
        }
    }
}
