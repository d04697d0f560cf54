// State management module
//
// ScanStateManager wraps ScanState with thread-safe access and emits change
// events so front ends can follow a scan without polling.

use crate::cancellation::Progress;
use crate::error::ScanResult;
use crate::models::{LogStatus, ScanProgress, ScanState};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Change events emitted when scan state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A batch has started
    ScanStarted { total_logs: usize },

    /// Processed count, total or current log changed
    ProgressUpdated {
        current: usize,
        total: usize,
        current_log: Option<String>,
    },

    /// One log reached its final status
    LogProcessed {
        log: String,
        status: LogStatus,
        message: String,
    },

    /// The batch has finished (or was abandoned)
    ScanFinished {
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe scan state with event emission.
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations; events are derived by diffing
///   the state before and after
/// - [`subscribe()`](Self::subscribe) for listening to [`StateChange`]s
///
/// It is also a [`Progress<ScanProgress>`] sink, so a scan batch can report
/// straight into it.
#[derive(Clone)]
pub struct ScanStateManager {
    state: Arc<RwLock<ScanState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl ScanStateManager {
    /// New manager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ScanState::default())),
            state_tx,
        }
    }

    pub fn snapshot(&self) -> ScanState {
        self.state.read().clone()
    }

    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScanState) -> R,
    {
        f(&self.state.read())
    }

    /// Apply `update_fn` and emit the resulting change events
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut ScanState),
    {
        let mut state = self.state.write();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);
        for change in &changes {
            self.emit(change.clone());
        }
        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    pub fn start_scan(&self, total_logs: usize) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_scan_state();
            state.is_scanning = true;
            state.total_logs = total_logs;
            state.current_operation = "Scanning crash logs...".to_string();
        })
    }

    pub fn finish_scan(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_scanning = false;
            state.current_log = None;
            state.current_operation.clear();
        })
    }

    /// Record the final status of one log
    pub fn add_log_result(&self, log: String, status: LogStatus, message: String) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.current_log = Some(log.clone());
            state.add_result(log.clone(), status);
        });

        let processed = StateChange::LogProcessed {
            log,
            status,
            message,
        };
        self.emit(processed.clone());
        changes.push(processed);
        changes
    }

    pub fn reset_scan_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_scan_state());
        self.emit(StateChange::StateReset);
        changes.push(StateChange::StateReset);
        changes
    }

    fn emit(&self, change: StateChange) {
        // No subscribers is fine
        let _ = self.state_tx.send(change);
    }
}

impl Default for ScanStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress<ScanProgress> for ScanStateManager {
    fn report(&self, value: ScanProgress) -> ScanResult<()> {
        match value {
            ScanProgress::Started { total } => {
                self.start_scan(total);
            }
            ScanProgress::LogProcessed {
                log,
                status,
                message,
            } => {
                self.add_log_result(log, status, message);
            }
            ScanProgress::Finished => {
                self.finish_scan();
            }
        }
        Ok(())
    }
}

fn detect_changes(old: &ScanState, new: &ScanState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.is_scanning != new.is_scanning {
        if new.is_scanning {
            changes.push(StateChange::ScanStarted {
                total_logs: new.total_logs,
            });
        } else {
            let (succeeded, skipped, failed, _) = new.scan_stats();
            changes.push(StateChange::ScanFinished {
                succeeded,
                skipped,
                failed,
            });
        }
    }

    if old.processed != new.processed
        || old.total_logs != new.total_logs
        || old.current_log != new.current_log
    {
        changes.push(StateChange::ProgressUpdated {
            current: new.processed,
            total: new.total_logs,
            current_log: new.current_log.clone(),
        });
    }

    changes
}
