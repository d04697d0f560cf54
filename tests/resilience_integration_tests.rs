//! Integration tests for the error policy, resilient executor and circuit breaker
//!
//! These tests verify that:
//! - The executor nests around the breaker the way the scan pipeline uses them
//! - Retries stop as soon as the policy skips or fails
//! - Cancellation interrupts a pending retry delay
//! - A custom ErrorHandlingPolicy drives the executor
//! - The breaker recovers through HalfOpen after its timeout

use classic::cancellation::CancellationTokenSource;
use classic::resilience::{
    CircuitBreaker, CircuitState, DefaultErrorPolicy, ErrorAction, ErrorHandlingPolicy,
    ErrorHandlingResult, ResilientExecutor, Severity,
};
use classic::{CancellationToken, ScanError};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

fn transient() -> ScanError {
    ScanError::Io(io::Error::from(io::ErrorKind::TimedOut))
}

/// Policy that retries everything without delay up to a fixed attempt count
struct RetryUpTo(u32);

impl ErrorHandlingPolicy for RetryUpTo {
    fn handle_error(&self, error: &ScanError, context: &str, attempt: u32) -> ErrorHandlingResult {
        let action = if attempt < self.0 {
            ErrorAction::Retry
        } else {
            ErrorAction::Skip
        };
        ErrorHandlingResult {
            action,
            retry_delay: Some(Duration::ZERO),
            message: format!("{context}: attempt {attempt}: {error}"),
            severity: Severity::Warning,
        }
    }
}

#[tokio::test]
async fn test_transient_failures_recover_through_breaker() {
    let executor = ResilientExecutor::new(DefaultErrorPolicy::new(3, Duration::from_millis(1)));
    let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
    let calls = AtomicU32::new(0);

    let result = executor
        .execute(
            || {
                breaker.call(|| async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("Fallout 4 v1.10.163")
                    }
                })
            },
            "parse crash-1.log",
            &CancellationToken::none(),
        )
        .await
        .unwrap();

    assert_eq!(result, Some("Fallout 4 v1.10.163"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(executor.retry_count(), 2);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_skip_and_open_breaker() {
    let executor = ResilientExecutor::new(DefaultErrorPolicy::new(3, Duration::from_millis(1)));
    let breaker = CircuitBreaker::new(4, Duration::from_secs(60));
    let calls = AtomicU32::new(0);

    let result: Option<()> = executor
        .execute(
            || {
                breaker.call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                })
            },
            "parse crash-2.log",
            &CancellationToken::none(),
        )
        .await
        .unwrap();

    // One initial attempt plus three retries, then the policy skips
    assert!(result.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(breaker.state(), CircuitState::Open);

    // The open breaker now rejects without running the operation
    let rejected = breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(matches!(rejected, Err(ScanError::CircuitOpen)));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_inaccessible_file_is_never_retried() {
    let executor = ResilientExecutor::new(DefaultErrorPolicy::new(3, Duration::from_millis(1)));
    let calls = AtomicU32::new(0);

    let result: Option<()> = executor
        .execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScanError::Io(io::Error::from(io::ErrorKind::PermissionDenied))) }
            },
            "read crash-3.log",
            &CancellationToken::none(),
        )
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.retry_count(), 0);
}

#[tokio::test]
async fn test_out_of_memory_fails_with_original_error() {
    let executor = ResilientExecutor::new(DefaultErrorPolicy::default());

    let err = executor
        .execute(
            || async { Err::<(), _>(ScanError::OutOfMemory("line buffer".to_string())) },
            "parse crash-4.log",
            &CancellationToken::none(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::OutOfMemory(ref what) if what == "line buffer"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_delay() {
    let executor = ResilientExecutor::new(DefaultErrorPolicy::new(3, Duration::from_secs(30)));
    let source = CancellationTokenSource::new();
    source.cancel_after(Duration::from_millis(20));

    let started = Instant::now();
    let err = executor
        .execute(
            || async { Err::<(), _>(transient()) },
            "parse crash-5.log",
            &source.token(),
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_custom_policy_drives_executor() {
    let executor = ResilientExecutor::new(RetryUpTo(5));
    let calls = AtomicU32::new(0);

    let result: Option<u32> = executor
        .execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScanError::Other(anyhow::anyhow!("unreadable header"))) }
            },
            "parse crash-6.log",
            &CancellationToken::none(),
        )
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(executor.retry_count(), 4);
}

#[tokio::test]
async fn test_breaker_recovers_after_timeout() {
    let breaker = CircuitBreaker::new(2, Duration::from_millis(30));
    for _ in 0..2 {
        let _ = breaker.call(|| async { Err::<(), _>(transient()) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(
        breaker.call(|| async { Ok(()) }).await,
        Err(ScanError::CircuitOpen)
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;

    breaker.call(|| async { Ok(()) }).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
}

#[tokio::test]
async fn test_breaker_counts_concurrent_failures() {
    let breaker = std::sync::Arc::new(CircuitBreaker::new(100, Duration::from_secs(60)));

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let breaker = std::sync::Arc::clone(&breaker);
            tokio::spawn(async move {
                let _ = breaker.call(|| async { Err::<(), _>(transient()) }).await;
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(breaker.failure_count(), 50);
    assert_eq!(breaker.state(), CircuitState::Closed);
}
