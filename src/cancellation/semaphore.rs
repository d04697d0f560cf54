use super::CancellationToken;
use crate::error::{ScanError, ScanResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore whose acquisitions race against cancellation
#[derive(Debug, Clone)]
pub struct CancellableSemaphore {
    semaphore: Arc<Semaphore>,
}

impl CancellableSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait as long as needed for a permit
    pub async fn acquire(&self, token: &CancellationToken) -> ScanResult<SemaphoreReleaser> {
        token.check(Some("acquire semaphore"))?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ScanError::cancelled_during("acquire semaphore")),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(SemaphoreReleaser::new)
                .map_err(|_| ScanError::Disposed),
        }
    }

    /// Wait up to `timeout`; `Ok(None)` when no permit became free in time
    pub async fn acquire_timeout(
        &self,
        timeout: Duration,
        token: &CancellationToken,
    ) -> ScanResult<Option<SemaphoreReleaser>> {
        match tokio::time::timeout(timeout, self.acquire(token)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// Scoped permit. Released on drop or on the first [`release`](Self::release)
/// call, never twice.
#[derive(Debug)]
pub struct SemaphoreReleaser {
    permit: Option<OwnedSemaphorePermit>,
}

impl SemaphoreReleaser {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        Self {
            permit: Some(permit),
        }
    }

    pub fn release(&mut self) {
        self.permit.take();
    }

    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}
