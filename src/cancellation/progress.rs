// Progress reporting sinks.

use crate::error::ScanResult;

/// Receives progress values from a running operation
pub trait Progress<T>: Send + Sync {
    fn report(&self, value: T) -> ScanResult<()>;
}

impl<T, F> Progress<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn report(&self, value: T) -> ScanResult<()> {
        self(value);
        Ok(())
    }
}

/// Wraps a sink so reporting can never fail the operation being reported on.
///
/// Cancellation raised by the inner sink is logged at debug level, any other
/// error at warn level; both are swallowed.
pub struct CancellationAwareProgress<'a, T> {
    inner: &'a dyn Progress<T>,
}

impl<'a, T> CancellationAwareProgress<'a, T> {
    pub fn new(inner: &'a dyn Progress<T>) -> Self {
        Self { inner }
    }
}

impl<T> Progress<T> for CancellationAwareProgress<'_, T> {
    fn report(&self, value: T) -> ScanResult<()> {
        match self.inner.report(value) {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Progress sink cancelled: {}", e);
            }
            Err(e) => {
                tracing::warn!("Progress sink failed: {}", e);
            }
        }
        Ok(())
    }
}
