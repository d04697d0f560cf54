//! Integration tests for ScanStateManager with state change events
//!
//! These tests verify that the ScanStateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Handles concurrent access from multiple threads
//! - Acts as a progress sink for scan batches

use classic::models::{LogStatus, ScanProgress};
use classic::{Progress, ScanStateManager, StateChange};
use std::sync::Arc;
use std::thread;
use tokio::time::{Duration, timeout};

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<StateChange>) -> StateChange {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_state_change_events_emitted() {
    let state = Arc::new(ScanStateManager::new());
    let mut rx = state.subscribe();

    state.start_scan(2);

    let event = next_event(&mut rx).await;
    assert!(
        matches!(event, StateChange::ScanStarted { total_logs: 2 }),
        "Expected ScanStarted event, got: {:?}",
        event
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(ScanStateManager::new());
    let mut receivers = vec![state.subscribe(), state.subscribe(), state.subscribe()];

    state.update(|s| {
        s.is_scanning = true;
        s.total_logs = 5;
    });

    for rx in &mut receivers {
        let event = next_event(rx).await;
        assert_eq!(event, StateChange::ScanStarted { total_logs: 5 });
    }
}

#[tokio::test]
async fn test_full_scan_event_sequence() {
    let state = ScanStateManager::new();
    let mut rx = state.subscribe();

    state.start_scan(2);
    state.add_log_result(
        "crash-1.log".to_string(),
        LogStatus::Succeeded,
        "3 plugins, 2 modules".to_string(),
    );
    state.add_log_result("crash-2.log".to_string(), LogStatus::Skipped, "not a crash log".to_string());
    state.finish_scan();

    let mut events = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }

    assert_eq!(events.first(), Some(&StateChange::ScanStarted { total_logs: 2 }));
    assert!(events.contains(&StateChange::LogProcessed {
        log: "crash-2.log".to_string(),
        status: LogStatus::Skipped,
        message: "not a crash log".to_string(),
    }));
    assert!(events.contains(&StateChange::ProgressUpdated {
        current: 2,
        total: 2,
        current_log: Some("crash-2.log".to_string()),
    }));
    assert!(events.contains(&StateChange::ScanFinished {
        succeeded: 1,
        skipped: 1,
        failed: 0,
    }));
}

#[tokio::test]
async fn test_progress_sink_drives_state() {
    let state = ScanStateManager::new();
    let sink: &dyn Progress<ScanProgress> = &state;

    sink.report(ScanProgress::Started { total: 3 }).unwrap();
    for (log, status) in [
        ("crash-a.log", LogStatus::Succeeded),
        ("crash-b.log", LogStatus::Failed),
        ("crash-c.log", LogStatus::Succeeded),
    ] {
        sink.report(ScanProgress::LogProcessed {
            log: log.to_string(),
            status,
            message: String::new(),
        })
        .unwrap();
    }

    let mid = state.snapshot();
    assert!(mid.is_scanning);
    assert_eq!(mid.scan_stats(), (2, 0, 1, 3));
    assert!((mid.progress_fraction() - 1.0).abs() < f64::EPSILON);

    sink.report(ScanProgress::Finished).unwrap();
    let done = state.snapshot();
    assert!(!done.is_scanning);
    assert!(done.current_log.is_none());
    assert!(done.failed_logs.contains("crash-b.log"));
}

#[tokio::test]
async fn test_reset_emits_state_reset() {
    let state = ScanStateManager::new();
    state.start_scan(1);
    state.add_log_result("crash-1.log".to_string(), LogStatus::Failed, "boom".to_string());

    let mut rx = state.subscribe();
    let changes = state.reset_scan_state();

    assert!(changes.contains(&StateChange::StateReset));
    assert_eq!(state.read(|s| s.processed), 0);

    let mut saw_reset = false;
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        saw_reset |= event == StateChange::StateReset;
    }
    assert!(saw_reset);
}

#[test]
fn test_concurrent_results_are_not_lost() {
    let state = Arc::new(ScanStateManager::new());
    state.start_scan(400);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..100 {
                    state.add_log_result(
                        format!("crash-{worker}-{i}.log"),
                        LogStatus::Succeeded,
                        String::new(),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = state.snapshot();
    assert_eq!(snapshot.processed, 400);
    assert_eq!(snapshot.succeeded_logs.len(), 400);
}

#[test]
fn test_no_subscribers_is_fine() {
    let state = ScanStateManager::new();
    let changes = state.start_scan(1);
    assert!(!changes.is_empty());
}
