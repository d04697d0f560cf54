use crate::error::{ScanError, ScanResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Calls are rejected
    HalfOpen, // One trial call is allowed through
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Stops calling a failing operation after repeated failures.
///
/// `Closed → Open` once `failure_threshold` consecutive failures are recorded.
/// While `Open` calls fail fast with [`ScanError::CircuitOpen`] until `timeout`
/// has passed since the last failure; then the breaker goes `HalfOpen` and lets
/// exactly one trial through. Any success closes it and zeroes the count, a
/// failed trial re-opens it. Every transition happens under one lock.
///
/// Cancellation is not counted as a failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Run `operation` if the breaker admits it
    pub async fn call<T, F, Fut>(&self, operation: F) -> ScanResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ScanResult<T>>,
    {
        self.call_counting(operation, |_| true).await
    }

    /// Like [`call`](Self::call), but only errors for which `counts` returns
    /// true are recorded as failures. Cancellation is never recorded.
    ///
    /// An uncounted error leaves the state unchanged. If it ends a half-open
    /// trial, the trial slot is freed for the next caller.
    pub async fn call_counting<T, F, Fut, P>(&self, operation: F, counts: P) -> ScanResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ScanResult<T>>,
        P: FnOnce(&ScanError) -> bool,
    {
        let mut permit = self.admit()?;
        let result = operation().await;
        match &result {
            Ok(_) => {
                self.record_success();
                permit.completed = true;
            }
            Err(e) if !e.is_cancelled() && counts(e) => {
                self.record_failure();
                permit.completed = true;
            }
            // Dropping the permit frees the trial slot
            Err(_) => {}
        }
        result
    }

    /// Force the breaker back to `Closed`
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
        tracing::info!("Circuit breaker manually reset to Closed state");
    }

    fn admit(&self) -> ScanResult<TrialPermit<'_>> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(TrialPermit::untracked(self)),
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() > self.timeout);
                if !cooled_down {
                    return Err(ScanError::CircuitOpen);
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!("Circuit breaker moved to HalfOpen state");
                Ok(TrialPermit::trial(self))
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(ScanError::CircuitOpen),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(TrialPermit::trial(self))
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("Circuit breaker closed after successful call");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!("Circuit breaker reopened due to failure in HalfOpen state");
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    failure_count = inner.failure_count,
                    threshold = self.failure_threshold,
                    "Circuit breaker opened due to failures"
                );
            }
            _ => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

/// Frees the half-open trial slot if the call is dropped before it finishes
struct TrialPermit<'a> {
    breaker: &'a CircuitBreaker,
    is_trial: bool,
    completed: bool,
}

impl<'a> TrialPermit<'a> {
    fn untracked(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            is_trial: false,
            completed: false,
        }
    }

    fn trial(breaker: &'a CircuitBreaker) -> Self {
        Self {
            breaker,
            is_trial: true,
            completed: false,
        }
    }
}

impl Drop for TrialPermit<'_> {
    fn drop(&mut self) {
        if self.is_trial && !self.completed {
            self.breaker.inner.lock().trial_in_flight = false;
        }
    }
}
