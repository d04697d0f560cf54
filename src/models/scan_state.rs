use std::collections::HashSet;

/// Runtime state of a scan batch.
///
/// Owned by [`ScanStateManager`](crate::state::ScanStateManager), which wraps it
/// in `Arc<RwLock<_>>` and emits [`StateChange`](crate::state::StateChange)
/// events on every mutation. Don't hold one of these across a scan expecting it
/// to update; take a fresh snapshot.
#[derive(Clone, Debug, Default)]
pub struct ScanState {
    pub is_scanning: bool,
    pub current_log: Option<String>,
    pub current_operation: String,

    pub processed: usize,
    pub total_logs: usize,

    pub succeeded_logs: HashSet<String>,
    pub skipped_logs: HashSet<String>,
    pub failed_logs: HashSet<String>,
}

/// Final status of one log within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStatus {
    Succeeded,
    Skipped,
    Failed,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Progress events emitted by a scan batch
#[derive(Debug, Clone, PartialEq)]
pub enum ScanProgress {
    Started {
        total: usize,
    },
    LogProcessed {
        log: String,
        status: LogStatus,
        message: String,
    },
    Finished,
}

impl ScanState {
    /// (succeeded, skipped, failed, total)
    pub fn scan_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.succeeded_logs.len(),
            self.skipped_logs.len(),
            self.failed_logs.len(),
            self.total_logs,
        )
    }

    /// Fraction of the batch processed, 0.0 when nothing is queued
    pub fn progress_fraction(&self) -> f64 {
        if self.total_logs == 0 {
            0.0
        } else {
            self.processed as f64 / self.total_logs as f64
        }
    }

    pub fn add_result(&mut self, log: String, status: LogStatus) {
        match status {
            LogStatus::Succeeded => self.succeeded_logs.insert(log),
            LogStatus::Skipped => self.skipped_logs.insert(log),
            LogStatus::Failed => self.failed_logs.insert(log),
        };
        self.processed += 1;
    }

    pub fn reset_scan_state(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_result_advances_progress() {
        let mut state = ScanState {
            total_logs: 4,
            ..Default::default()
        };
        state.add_result("crash-1.log".into(), LogStatus::Succeeded);
        state.add_result("crash-2.log".into(), LogStatus::Skipped);
        state.add_result("crash-3.log".into(), LogStatus::Failed);

        assert_eq!(state.scan_stats(), (1, 1, 1, 4));
        assert_eq!(state.processed, 3);
        assert!((state.progress_fraction() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_fraction_empty_batch() {
        assert_eq!(ScanState::default().progress_fraction(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut state = ScanState {
            is_scanning: true,
            total_logs: 2,
            ..Default::default()
        };
        state.add_result("crash-1.log".into(), LogStatus::Failed);
        state.reset_scan_state();

        assert!(!state.is_scanning);
        assert_eq!(state.scan_stats(), (0, 0, 0, 0));
    }
}
