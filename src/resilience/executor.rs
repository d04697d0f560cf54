use super::policy::{DefaultErrorPolicy, ErrorAction, ErrorHandlingPolicy};
use crate::cancellation::CancellationToken;
use crate::error::{ScanError, ScanResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runs operations under an [`ErrorHandlingPolicy`].
///
/// This is the single place where failures become decisions:
/// - `Ok(Some(value))`: the operation succeeded
/// - `Ok(None)`: the policy chose `Skip` or `Continue`
/// - `Err(e)`: the policy chose `Fail`; `e` is the original error
///
/// The retry loop has no cap of its own; it ends because the policy eventually
/// returns something other than `Retry`.
#[derive(Debug, Default)]
pub struct ResilientExecutor<P = DefaultErrorPolicy> {
    policy: P,
    retries: AtomicU64,
}

impl<P: ErrorHandlingPolicy> ResilientExecutor<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            retries: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Retries scheduled since construction
    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        context: &str,
        token: &CancellationToken,
    ) -> ScanResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ScanResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            token.check(Some(context))?;

            let error = match operation().await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => e,
            };

            let decision = self.policy.handle_error(&error, context, attempt);
            decision.severity.log(&decision.message);

            match decision.action {
                ErrorAction::Continue | ErrorAction::Skip => return Ok(None),
                ErrorAction::Fail => return Err(error),
                ErrorAction::Retry => {
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = decision.retry_delay.unwrap_or_default();
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(ScanError::cancelled_during(context)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationTokenSource;
    use crate::resilience::policy::{ErrorHandlingResult, Severity};
    use std::io;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn fast_executor() -> ResilientExecutor {
        ResilientExecutor::new(DefaultErrorPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_success_returns_value() {
        let executor = fast_executor();
        let result = executor
            .execute(|| async { Ok::<_, ScanError>(42) }, "answer", &CancellationToken::none())
            .await
            .unwrap();
        assert_eq!(result, Some(42));
        assert_eq!(executor.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let executor = fast_executor();
        let calls = AtomicU32::new(0);

        let result = executor
            .execute(
                || {
                    let call = calls.fetch_add(1, Ordering::Relaxed);
                    async move {
                        if call < 2 {
                            Err(ScanError::Io(io::Error::from(io::ErrorKind::Interrupted)))
                        } else {
                            Ok("parsed")
                        }
                    }
                },
                "parse crash-1.log",
                &CancellationToken::none(),
            )
            .await
            .unwrap();

        assert_eq!(result, Some("parsed"));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(executor.retry_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_transient_failure_is_skipped() {
        let executor = fast_executor();
        let calls = AtomicU32::new(0);

        let result: Option<()> = executor
            .execute(
                || {
                    calls.fetch_add(1, Ordering::Relaxed);
                    async { Err(ScanError::Timeout(Duration::from_secs(1))) }
                },
                "read",
                &CancellationToken::none(),
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_missing_file_skipped_without_retry() {
        let executor = fast_executor();
        let calls = AtomicU32::new(0);

        let result: Option<()> = executor
            .execute(
                || {
                    calls.fetch_add(1, Ordering::Relaxed);
                    async { Err(ScanError::Io(io::Error::from(io::ErrorKind::NotFound))) }
                },
                "read",
                &CancellationToken::none(),
            )
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fail_rethrows_original_error() {
        let executor = fast_executor();
        let err = executor
            .execute(
                || async { Err::<(), _>(ScanError::OutOfMemory("parse buffer".into())) },
                "parse",
                &CancellationToken::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::OutOfMemory(ref msg) if msg == "parse buffer"));
    }

    #[tokio::test]
    async fn test_cancelled_during_retry_delay() {
        struct SlowRetry;
        impl ErrorHandlingPolicy for SlowRetry {
            fn handle_error(&self, _: &ScanError, _: &str, _: u32) -> ErrorHandlingResult {
                ErrorHandlingResult {
                    action: ErrorAction::Retry,
                    retry_delay: Some(Duration::from_secs(60)),
                    message: "retrying".to_string(),
                    severity: Severity::Warning,
                }
            }
        }

        let executor = ResilientExecutor::new(SlowRetry);
        let source = CancellationTokenSource::new();
        let token = source.token();

        let run = executor.execute(
            || async { Err::<(), _>(ScanError::Timeout(Duration::from_secs(1))) },
            "slow",
            &token,
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.cancel();
        };

        let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(run, cancel)
        })
        .await
        .expect("executor ignored cancellation");
        assert!(result.unwrap_err().is_cancelled());
    }
}
