//! Integration tests for the adaptive resource manager and cancellation primitives
//!
//! These tests verify that:
//! - Concurrent tasks never exceed the slot limit
//! - Raising the limit releases waiting tasks immediately
//! - Disposing the manager fails waiting acquisitions
//! - Timed semaphore acquisition gives up cleanly
//! - Checkpoints stop a loop once its token is cancelled

use classic::cancellation::{CancellableSemaphore, checkpoint};
use classic::resources::{LoadSample, LoadSampler, ResourceLimits, ResourceManager};
use classic::{CancellationToken, CancellationTokenSource, ScanError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct FixedLoad(f32);

impl LoadSampler for FixedLoad {
    fn sample(&mut self) -> LoadSample {
        LoadSample {
            cpu_percent: self.0,
            available_memory_bytes: 8 * 1024 * 1024 * 1024,
        }
    }
}

fn manager(initial: usize, max: usize, cpu_percent: f32) -> Arc<ResourceManager> {
    Arc::new(ResourceManager::new(
        ResourceLimits {
            initial_limit: initial,
            max_limit: max,
            sample_interval: Duration::from_secs(60),
        },
        Box::new(FixedLoad(cpu_percent)),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_limit() {
    let manager = manager(3, 6, 60.0);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                let _slot = manager.acquire_slot(&CancellationToken::none()).await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(manager.available_slots(), 3);
}

#[tokio::test]
async fn test_low_load_releases_waiters() {
    let manager = manager(1, 4, 10.0);
    let _held = manager.try_acquire_slot().unwrap().unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .acquire_slot(&CancellationToken::none())
                .await
                .map(|_| ())
        })
    };
    tokio::task::yield_now().await;

    assert_eq!(manager.evaluate_load().unwrap(), 2);
    let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter was not released")
        .unwrap();
    assert!(acquired.is_ok());
}

#[tokio::test]
async fn test_high_load_shrinks_for_new_work_only() {
    let manager = manager(4, 8, 95.0);
    let held: Vec<_> = (0..4)
        .map(|_| manager.try_acquire_slot().unwrap().unwrap())
        .collect();

    assert_eq!(manager.evaluate_load().unwrap(), 2);
    assert_eq!(manager.current_limit(), 2);

    // All four holders keep their slots until they finish
    drop(held);
    assert_eq!(manager.available_slots(), 2);
}

#[tokio::test]
async fn test_dispose_fails_waiting_acquisitions() {
    let manager = manager(1, 2, 60.0);
    let _held = manager.try_acquire_slot().unwrap().unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.acquire_slot(&CancellationToken::none()).await.map(|_| ()) })
    };
    tokio::task::yield_now().await;

    manager.dispose();
    let result = waiter.await.unwrap();

    assert!(matches!(result, Err(ScanError::Disposed)));
    assert!(manager.is_disposed());
    assert_eq!(manager.max_limit(), 2);
}

#[tokio::test]
async fn test_cancelled_token_stops_waiting_acquisition() {
    let manager = manager(1, 2, 60.0);
    let _held = manager.try_acquire_slot().unwrap().unwrap();
    let source = CancellationTokenSource::with_timeout(Duration::from_millis(20));

    let err = manager.acquire_slot(&source.token()).await.err().unwrap();

    assert!(err.is_cancelled());
    assert_eq!(manager.available_slots(), 0);
}

#[tokio::test]
async fn test_semaphore_timed_acquire() {
    let semaphore = CancellableSemaphore::new(1);
    let token = CancellationToken::none();

    let mut first = semaphore.acquire(&token).await.unwrap();
    let timed_out = semaphore
        .acquire_timeout(Duration::from_millis(10), &token)
        .await
        .unwrap();
    assert!(timed_out.is_none());

    first.release();
    assert!(first.is_released());
    let second = semaphore
        .acquire_timeout(Duration::from_millis(10), &token)
        .await
        .unwrap();
    assert!(second.is_some());
}

#[tokio::test]
async fn test_checkpoint_stops_loop() {
    let source = CancellationTokenSource::new();
    let token = source.token();
    let mut completed = 0;

    let result: Result<(), ScanError> = async {
        for i in 0..100 {
            if i == 10 {
                source.cancel();
            }
            checkpoint(&token, Some("scan batch"), None).await?;
            completed += 1;
        }
        Ok(())
    }
    .await;

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(completed, 10);
}
