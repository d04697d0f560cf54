//! Adaptive concurrency limit for scan operations.
//!
//! [`ResourceManager`] hands out [`ResourceSlot`]s from a tokio semaphore and
//! periodically re-derives the slot count from system load:
//!
//! - CPU above 80%: halve the limit
//! - CPU below 40%: double it (capped at the maximum)
//! - available memory under 500 MB: halve again
//! - clamp to `[1, max_limit]`
//!
//! Growth is applied immediately by adding permits. Shrinking is lazy: idle
//! permits are retired at once, held ones are retired when their slot is
//! released. In-flight work is never revoked.

pub mod sampler;

pub use sampler::{LoadSample, LoadSampler, SysinfoSampler};

use crate::cancellation::{CancellationToken, CancellationTokenSource};
use crate::error::{ScanError, ScanResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

const HIGH_CPU_PERCENT: f32 = 80.0;
const LOW_CPU_PERCENT: f32 = 40.0;
const LOW_MEMORY_BYTES: u64 = 500 * 1024 * 1024;

/// Limits and sampling cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub initial_limit: usize,
    pub max_limit: usize,
    pub sample_interval: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            initial_limit: cpus,
            max_limit: (cpus * 2).max(4),
            sample_interval: Duration::from_secs(5),
        }
    }
}

/// Target limit for a load sample, given the current limit
pub fn compute_target_limit(current: usize, max_limit: usize, sample: LoadSample) -> usize {
    let mut target = current;
    if sample.cpu_percent > HIGH_CPU_PERCENT {
        target /= 2;
    } else if sample.cpu_percent < LOW_CPU_PERCENT {
        target = target.saturating_mul(2).min(max_limit);
    }
    if sample.available_memory_bytes < LOW_MEMORY_BYTES {
        target /= 2;
    }
    target.clamp(1, max_limit.max(1))
}

#[derive(Debug)]
struct LimitState {
    current_limit: usize,
    /// Permits in existence, held or idle. Exceeds `current_limit` only while
    /// a shrink is waiting on held slots.
    total_permits: usize,
}

struct Inner {
    semaphore: Arc<Semaphore>,
    limits: Mutex<LimitState>,
    max_limit: usize,
    disposed: AtomicBool,
    sampler: Mutex<Box<dyn LoadSampler>>,
}

impl Inner {
    fn set_limit(&self, requested: usize) -> usize {
        let new_limit = requested.clamp(1, self.max_limit);
        let mut limits = self.limits.lock();

        if new_limit > limits.total_permits {
            self.semaphore.add_permits(new_limit - limits.total_permits);
            limits.total_permits = new_limit;
        } else {
            while limits.total_permits > new_limit {
                match self.semaphore.try_acquire() {
                    Ok(idle) => {
                        idle.forget();
                        limits.total_permits -= 1;
                    }
                    Err(_) => break,
                }
            }
        }

        if limits.current_limit != new_limit {
            tracing::info!(
                "Concurrency limit adjusted: {} -> {} (permits: {})",
                limits.current_limit,
                new_limit,
                limits.total_permits
            );
        }
        limits.current_limit = new_limit;
        new_limit
    }

    fn evaluate_load(&self) -> usize {
        let sample = self.sampler.lock().sample();
        let current = self.limits.lock().current_limit;
        let target = compute_target_limit(current, self.max_limit, sample);
        tracing::debug!(
            "Load sample: cpu {:.1}%, available memory {} MB, limit {} -> {}",
            sample.cpu_percent,
            sample.available_memory_bytes / (1024 * 1024),
            current,
            target
        );
        if target != current {
            self.set_limit(target)
        } else {
            current
        }
    }

    /// Return a permit, retiring it instead if the limit shrank meanwhile
    fn release(&self, permit: OwnedSemaphorePermit) {
        let mut limits = self.limits.lock();
        if limits.total_permits > limits.current_limit {
            permit.forget();
            limits.total_permits -= 1;
        } else {
            drop(permit);
        }
    }
}

/// Bounded, load-adaptive pool of scan slots
pub struct ResourceManager {
    inner: Arc<Inner>,
    monitor: Mutex<Option<(CancellationTokenSource, JoinHandle<()>)>>,
    sample_interval: Duration,
}

impl ResourceManager {
    pub fn new(limits: ResourceLimits, sampler: Box<dyn LoadSampler>) -> Self {
        let max_limit = limits.max_limit.max(1);
        let initial = limits.initial_limit.clamp(1, max_limit);
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(initial)),
                limits: Mutex::new(LimitState {
                    current_limit: initial,
                    total_permits: initial,
                }),
                max_limit,
                disposed: AtomicBool::new(false),
                sampler: Mutex::new(sampler),
            }),
            monitor: Mutex::new(None),
            sample_interval: limits.sample_interval,
        }
    }

    /// Manager with `sysinfo` sampling and the periodic monitor already running.
    /// Must be called inside a tokio runtime.
    pub fn start(limits: ResourceLimits) -> Self {
        let manager = Self::new(limits, Box::new(SysinfoSampler::new()));
        manager.spawn_monitor();
        manager
    }

    /// Spawn the periodic load evaluation. Calling it again restarts the task.
    pub fn start_monitoring(&self) -> ScanResult<()> {
        self.ensure_active()?;
        self.spawn_monitor();
        Ok(())
    }

    fn spawn_monitor(&self) {
        let source = CancellationTokenSource::new();
        let token = source.token();
        let inner = Arc::clone(&self.inner);
        let interval = self.sample_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; skip it so the first sample has a baseline
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if inner.disposed.load(Ordering::Acquire) {
                            break;
                        }
                        inner.evaluate_load();
                    }
                }
            }
            tracing::debug!("Resource monitor stopped");
        });

        if let Some((old_source, old_handle)) = self.monitor.lock().replace((source, handle)) {
            old_source.cancel();
            old_handle.abort();
        }
        tracing::info!("Resource monitor started (interval: {:?})", interval);
    }

    /// Wait for a slot, giving up if `token` is cancelled
    pub async fn acquire_slot(&self, token: &CancellationToken) -> ScanResult<ResourceSlot> {
        self.ensure_active()?;
        token.check(Some("acquire scan slot"))?;

        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ScanError::cancelled_during("acquire scan slot")),
            permit = Arc::clone(&self.inner.semaphore).acquire_owned() => {
                permit.map_err(|_| ScanError::Disposed)?
            }
        };
        Ok(ResourceSlot::new(Arc::clone(&self.inner), permit))
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire_slot(&self) -> ScanResult<Option<ResourceSlot>> {
        self.ensure_active()?;
        match Arc::clone(&self.inner.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Some(ResourceSlot::new(Arc::clone(&self.inner), permit))),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(ScanError::Disposed),
        }
    }

    /// Set the limit directly; clamped to `[1, max_limit]`
    pub fn set_limit(&self, limit: usize) -> ScanResult<usize> {
        self.ensure_active()?;
        Ok(self.inner.set_limit(limit))
    }

    /// Sample load once and apply the resulting limit
    pub fn evaluate_load(&self) -> ScanResult<usize> {
        self.ensure_active()?;
        Ok(self.inner.evaluate_load())
    }

    pub fn current_limit(&self) -> usize {
        self.inner.limits.lock().current_limit
    }

    pub fn max_limit(&self) -> usize {
        self.inner.max_limit
    }

    pub fn available_slots(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Stop the monitor and close the pool. Waiting acquisitions fail with
    /// [`ScanError::Disposed`]. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some((source, handle)) = self.monitor.lock().take() {
            source.cancel();
            handle.abort();
        }
        self.inner.semaphore.close();
        tracing::info!("Resource manager disposed");
    }

    fn ensure_active(&self) -> ScanResult<()> {
        if self.is_disposed() {
            Err(ScanError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// One held scan slot. Returned to the pool on drop or on the first
/// [`release`](Self::release) call.
pub struct ResourceSlot {
    inner: Arc<Inner>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ResourceSlot {
    fn new(inner: Arc<Inner>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            inner,
            permit: Some(permit),
        }
    }

    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.inner.release(permit);
        }
    }
}

impl Drop for ResourceSlot {
    fn drop(&mut self) {
        self.release();
    }
}
