//! Cooperative cancellation for long-running scans.
//!
//! Cancellation travels through a `tokio::sync::watch` channel: the
//! [`CancellationTokenSource`] owns the sender, every [`CancellationToken`] is a
//! receiver. Waiting on a token is event-driven (`changed()`), so a cancelled
//! batch unblocks queued tasks immediately instead of relying on polling.
//!
//! - [`checkpoint`] is the suspension point long loops call between units of work
//! - [`progress`] wraps progress sinks so reporting can never fail an operation
//! - [`semaphore`] adds cancellable, timed acquisition to a tokio semaphore

pub mod progress;
pub mod semaphore;

pub use progress::{CancellationAwareProgress, Progress};
pub use semaphore::{CancellableSemaphore, SemaphoreReleaser};

use crate::error::{ScanError, ScanResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Read side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// A token that can never be cancelled
    pub fn none() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the source was
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Error out if cancellation was requested
    pub fn check(&self, operation: Option<&str>) -> ScanResult<()> {
        if !self.is_cancelled() {
            return Ok(());
        }
        Err(match operation {
            Some(op) => ScanError::cancelled_during(op),
            None => ScanError::cancelled(),
        })
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

/// Write side of a cancellation signal, optionally driven by a timer
#[derive(Debug)]
pub struct CancellationTokenSource {
    tx: Arc<watch::Sender<bool>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    link: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            timer: Mutex::new(None),
            link: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Source that is also cancelled when `parent` is. Cancelling the child
    /// leaves the parent untouched. Must be called inside a tokio runtime.
    pub fn linked(parent: &CancellationToken) -> Self {
        let source = Self::new();
        if parent.is_cancelled() {
            source.tx.send_replace(true);
            return source;
        }
        let tx = Arc::clone(&source.tx);
        let parent = parent.clone();
        let handle = tokio::spawn(async move {
            parent.cancelled().await;
            tx.send_replace(true);
        });
        *source.link.lock() = Some(handle);
        source
    }

    /// Source that cancels itself after `timeout`. Must be called inside a tokio
    /// runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        let source = Self::new();
        source.cancel_after(timeout);
        source
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Request cancellation. No-op if already cancelled or disposed.
    pub fn cancel(&self) {
        if self.disposed.load(Ordering::Acquire) || self.is_cancelled() {
            return;
        }
        self.tx.send_replace(true);
        tracing::debug!("Cancellation requested");
    }

    /// Schedule cancellation without blocking. Replaces any earlier schedule.
    pub fn cancel_after(&self, delay: Duration) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let tx = Arc::clone(&self.tx);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !*tx.borrow() {
                tx.send_replace(true);
                tracing::debug!("Cancellation requested after {:?}", delay);
            }
        });
        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop any pending timer; later `cancel` calls become no-ops
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        if let Some(link) = self.link.lock().take() {
            link.abort();
        }
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationTokenSource {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        if let Some(link) = self.link.get_mut().take() {
            link.abort();
        }
    }
}

/// Cooperative suspension point.
///
/// Fails immediately if `token` is cancelled (naming `operation` in the error),
/// otherwise reports `operation` to `progress` and yields once to the scheduler.
pub async fn checkpoint(
    token: &CancellationToken,
    operation: Option<&str>,
    progress: Option<&dyn Progress<String>>,
) -> ScanResult<()> {
    token.check(operation)?;

    if let (Some(progress), Some(operation)) = (progress, operation) {
        // Sinks are wrapped by callers that care; a failing report never aborts
        if let Err(e) = progress.report(operation.to_string()) {
            tracing::debug!("Progress report for '{}' failed: {}", operation, e);
        }
    }

    tokio::task::yield_now().await;
    Ok(())
}
