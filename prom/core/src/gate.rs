//! Admission Gate
//!
//! A counting semaphore that bounds how many backend requests may be in flight
//! at once. Permits are handed out as RAII guards, so a permit is returned on
//! every exit path of the holder, including early returns and panics.
//!
//! # Design
//!
//! The gate wraps a [`tokio::sync::Semaphore`], which queues waiters in FIFO
//! order and wakes one waiter per returned permit. Usage counters are kept in
//! atomics alongside it so that statistics can be read without touching the
//! semaphore.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tracing::{info, trace};

/// Default gate capacity, matching Prometheus' default `--query.max-concurrency`
pub const DEFAULT_CAPACITY: usize = 20;

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by [`AdmissionGate`]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// The underlying semaphore was closed
    #[error("admission gate is closed")]
    Closed,

    /// No permit became available within the allotted time
    #[error("timed out after {0:?} waiting for an admission permit")]
    Timeout(Duration),

    /// Requested capacity is outside `1..=Semaphore::MAX_PERMITS`
    #[error("invalid admission gate capacity {0}")]
    InvalidCapacity(usize),
}

// ============================================================================
// Statistics
// ============================================================================

/// Point-in-time view of gate usage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Configured number of permits
    pub capacity: usize,
    /// Permits currently held
    pub in_flight: usize,
    /// Highest number of permits held at once since creation
    pub peak_in_flight: usize,
    /// Tasks currently waiting for a permit
    pub waiting: usize,
    /// Total permits handed out
    pub total_acquired: u64,
}

#[derive(Default)]
struct GateStatsAtomic {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    waiting: AtomicUsize,
    total_acquired: AtomicU64,
}

impl GateStatsAtomic {
    fn record_acquire(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::AcqRel);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
    }

    fn record_release(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Decrements the waiter count even if the acquiring future is dropped
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Admission Gate
// ============================================================================

/// Counting semaphore limiting concurrent backend requests
pub struct AdmissionGate {
    semaphore: Semaphore,
    /// Logical capacity; tracks `set_capacity` calls
    capacity: AtomicUsize,
    /// Serializes capacity changes
    resize: Mutex<()>,
    stats: GateStatsAtomic,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AdmissionGate {
    /// Create a gate with `capacity` permits
    ///
    /// The capacity is clamped into `1..=Semaphore::MAX_PERMITS`; a gate with
    /// no permits would block every caller forever.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Semaphore::new(capacity),
            capacity: AtomicUsize::new(capacity),
            resize: Mutex::new(()),
            stats: GateStatsAtomic::default(),
        }
    }

    /// Configured number of permits
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Current usage statistics
    pub fn stats(&self) -> GateStats {
        GateStats {
            capacity: self.capacity(),
            in_flight: self.stats.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.stats.peak_in_flight.load(Ordering::Acquire),
            waiting: self.stats.waiting.load(Ordering::Relaxed),
            total_acquired: self.stats.total_acquired.load(Ordering::Relaxed),
        }
    }

    /// Wait until a permit is available and take it
    pub async fn acquire(&self) -> Result<GatePermit<'_>, GateError> {
        let permit = {
            let _waiting = WaitingGuard::enter(&self.stats.waiting);
            self.semaphore
                .acquire()
                .await
                .map_err(|_| GateError::Closed)?
        };
        Ok(self.admit(permit))
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<GatePermit<'_>, GateError> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(GateError::Timeout(timeout)),
        }
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        self.semaphore.try_acquire().ok().map(|permit| self.admit(permit))
    }

    fn admit<'a>(&'a self, permit: SemaphorePermit<'a>) -> GatePermit<'a> {
        self.stats.record_acquire();
        GatePermit {
            _permit: permit,
            gate: self,
        }
    }

    /// Change the number of permits
    ///
    /// Growing takes effect immediately. Shrinking never revokes a held
    /// permit: it waits until enough permits have been returned and retires
    /// them, so the number of holders drifts down to the new capacity.
    pub async fn set_capacity(&self, capacity: usize) -> Result<(), GateError> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(GateError::InvalidCapacity(capacity));
        }

        let _resize = self.resize.lock().await;
        let current = self.capacity();

        if capacity > current {
            self.semaphore.add_permits(capacity - current);
        } else if capacity < current {
            let surplus = u32::try_from(current - capacity)
                .map_err(|_| GateError::InvalidCapacity(capacity))?;
            let _waiting = WaitingGuard::enter(&self.stats.waiting);
            self.semaphore
                .acquire_many(surplus)
                .await
                .map_err(|_| GateError::Closed)?
                .forget();
        }

        self.capacity.store(capacity, Ordering::Release);
        info!(from = current, to = capacity, "Admission gate capacity changed");
        Ok(())
    }
}

// ============================================================================
// Permit Guard
// ============================================================================

/// A held admission permit; returned to the gate on drop
pub struct GatePermit<'a> {
    // Returned to the semaphore when the guard's fields drop
    _permit: SemaphorePermit<'a>,
    gate: &'a AdmissionGate,
}

impl std::fmt::Debug for GatePermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.stats.record_release();
        trace!("Admission permit released");
    }
}
