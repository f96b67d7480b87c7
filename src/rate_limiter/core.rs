//! # Smooth Rate Limiter
//!
//! Callers hand the limiter a completion callback instead of blocking. The
//! limiter invokes it once a permit is available, paced by the current
//! [`Rate`].
//!
//! ```text
//!     submit(cb) ──► permit on hand and nobody waiting? ──Yes──► cb(Ok(()))
//!                              │
//!                              No
//!                              ▼
//!                        PermitBuffer ──► tick() ──► cb(Ok(())) in FIFO order
//!                              │              ▲
//!                              │              └── scheduled for the moment the
//!                              │                  next permit or expiry is due
//!                              ▼
//!                     Rejected / Evicted / Expired / Cancelled
//! ```
//!
//! ## Permit accounting
//!
//! Permits accrue continuously at `events / period_ms` per millisecond and
//! are capped at one period's worth. A rate change first books the time
//! elapsed under the old rate, then shifts the balance by the difference in
//! events per period. Several changes before the first tick therefore add up
//! to "the last rate applied from time zero".
//!
//! ## Event loop
//!
//! There is at most one live tick. Ticks are only scheduled while callbacks
//! are waiting, so an idle limiter costs nothing; the next submit restarts
//! the loop. Scheduled ticks hold a weak reference, dropping the limiter
//! stops them.
//!
//! ## Locking
//!
//! All state sits behind one `parking_lot::Mutex`. Callbacks are always
//! invoked after the lock is released.

use super::{
    buffer::{Completion, Enqueued, PendingCallback, PermitBuffer},
    config::RateLimiterConfig,
    error::{Cause, RateLimiterError},
    metrics::RateLimiterMetrics,
    rate::Rate,
    scheduler::SharedScheduler,
    utils::{RateLimitedLog, SharedClock},
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Tolerance for floating point permit balances.
const PERMIT_EPSILON: f64 = 1e-6;

/// Minimum spacing between "buffer over capacity" warnings.
const OVERFLOW_LOG_INTERVAL_MS: u64 = 60_000;

/// The operations shared by every limiter in this crate.
///
/// Both [`RateLimiter`] and [`RampUpRateLimiter`](super::RampUpRateLimiter)
/// implement it, so callers can hold either behind `dyn AsyncRateLimiter`.
pub trait AsyncRateLimiter: Send + Sync {
    /// Submits a callback to run once a permit is available.
    ///
    /// # Errors
    ///
    /// [`RateLimiterError::CapacityExceeded`] when the buffer is full and the
    /// policy rejects the callback. The callback is not invoked in that case.
    fn submit(&self, callback: Completion) -> Result<(), RateLimiterError>;

    /// Changes the rate.
    ///
    /// # Errors
    ///
    /// [`RateLimiterError::InvalidRate`] when the rate cannot be represented.
    fn set_rate(&self, events_per_period: f64, period_ms: u64, burst: u32) -> Result<(), RateLimiterError>;

    /// Fails every waiting callback, and every later submission, with `cause`.
    fn cancel_all(&self, cause: Cause);

    /// Rate currently in force.
    fn rate(&self) -> Rate;

    /// Callbacks waiting for a permit.
    fn pending(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct ScheduledTick {
    due_ms: u64,
    generation: u64,
}

struct LimiterState {
    rate: Rate,
    permits: f64,
    last_refill_ms: u64,
    buffer: PermitBuffer,
    next_tick: Option<ScheduledTick>,
    generation: u64,
    closed: Option<RateLimiterError>,
}

impl LimiterState {
    /// Books the permits earned since the last accounting.
    fn refill(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.last_refill_ms);
        if elapsed > 0 && !self.rate.is_zero() {
            let earned = self.rate.permits_per_ms() * elapsed as f64;
            self.permits = (self.permits + earned).min(self.rate.capacity());
        }
        self.last_refill_ms = self.last_refill_ms.max(now_ms);
    }

    #[inline]
    fn has_permit(&self) -> bool {
        self.permits + PERMIT_EPSILON >= 1.0
    }

    #[inline]
    fn take_permit(&mut self) {
        self.permits = (self.permits - 1.0).max(0.0);
    }

    /// When the next tick has something to do, if anything.
    fn next_due_ms(&self, now_ms: u64) -> Option<u64> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.buffer.overflow_len() > 0 || self.has_permit() {
            return Some(now_ms);
        }

        let permit_due = if self.rate.is_zero() {
            None
        } else {
            let missing = 1.0 - self.permits;
            let wait = (missing / self.rate.permits_per_ms() - PERMIT_EPSILON).ceil().max(1.0);
            Some(self.last_refill_ms.saturating_add(wait as u64))
        };

        match (permit_due, self.buffer.next_expiry_ms()) {
            (Some(permit), Some(expiry)) => Some(permit.min(expiry)),
            (permit, expiry) => permit.or(expiry),
        }
    }
}

#[derive(Default)]
struct Counters {
    granted: AtomicU64,
    rejected: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
    cancelled: AtomicU64,
    ticks: AtomicU64,
}

struct Inner {
    config: RateLimiterConfig,
    clock: SharedClock,
    scheduler: SharedScheduler,
    state: Mutex<LimiterState>,
    counters: Counters,
    overflow_log: RateLimitedLog,
    this: Weak<Inner>,
}

impl Inner {
    fn submit(&self, completion: Completion) -> Result<(), RateLimiterError> {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock();

        if let Some(error) = state.closed.clone() {
            drop(state);
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            completion(Err(error));
            return Ok(());
        }

        if state.buffer.is_empty() {
            state.refill(now_ms);
        }
        if state.buffer.is_empty() && state.has_permit() {
            state.take_permit();
            drop(state);
            self.counters.granted.fetch_add(1, Ordering::Relaxed);
            completion(Ok(()));
            return Ok(());
        }

        let evicted = match state.buffer.enqueue(PendingCallback::new(completion, now_ms)) {
            Enqueued::Queued => None,
            Enqueued::Evicted(oldest) => Some(oldest),
            Enqueued::OverCapacity => {
                if self.overflow_log.should_log(now_ms) {
                    warn!(
                        "Rate limiter {} is over capacity with {} waiting callbacks (max {}), running the excess unthrottled",
                        self.config.name,
                        state.buffer.len(),
                        self.config.max_buffered
                    );
                }
                None
            }
            Enqueued::Rejected(_) => {
                drop(state);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Rate limiter {} rejected a callback, buffer full at {}",
                    self.config.name, self.config.max_buffered
                );
                return Err(RateLimiterError::CapacityExceeded {
                    name: self.config.name.clone(),
                    max_buffered: self.config.max_buffered,
                });
            }
        };

        self.arm_tick(&mut state, now_ms);
        drop(state);

        if let Some(oldest) = evicted {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            oldest.fail(RateLimiterError::Evicted {
                name: self.config.name.clone(),
            });
        }
        Ok(())
    }

    fn set_rate(&self, rate: Rate) {
        let now_ms = self.clock.now_ms();
        let mut state = self.state.lock();

        state.refill(now_ms);
        let previous = state.rate;
        let delta = rate.events() as f64 - previous.events() as f64;
        state.permits = (state.permits + delta).max(0.0).min(rate.capacity());
        state.rate = rate;

        debug!(
            "Rate limiter {} rate changed from {} to {} ({:.2} permits available)",
            self.config.name, previous, rate, state.permits
        );

        self.arm_tick(&mut state, now_ms);
    }

    /// Schedules a tick for the next due time unless one is already armed
    /// for the same time or earlier.
    fn arm_tick(&self, state: &mut LimiterState, now_ms: u64) {
        let due_ms = match state.next_due_ms(now_ms) {
            Some(due) => due.max(now_ms),
            None => return,
        };
        if matches!(state.next_tick, Some(armed) if armed.due_ms <= due_ms) {
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        state.next_tick = Some(ScheduledTick { due_ms, generation });

        let this = self.this.clone();
        self.scheduler.schedule(
            due_ms - now_ms,
            Box::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.tick(generation);
                }
            }),
        );
    }

    fn tick(&self, generation: u64) {
        let now_ms = self.clock.now_ms();

        let (expired, granted) = {
            let mut state = self.state.lock();
            let armed = state.next_tick;
            match armed {
                Some(armed) if armed.generation == generation => state.next_tick = None,
                // Superseded by an earlier tick.
                _ => return,
            }

            self.counters.ticks.fetch_add(1, Ordering::Relaxed);
            state.refill(now_ms);

            let expired = state.buffer.evict_expired(now_ms);

            let mut granted = Vec::new();
            while state.buffer.overflow_len() > 0 {
                match state.buffer.dequeue() {
                    Some(callback) => granted.push(callback),
                    None => break,
                }
            }
            while state.has_permit() {
                match state.buffer.dequeue() {
                    Some(callback) => {
                        state.take_permit();
                        granted.push(callback);
                    }
                    None => break,
                }
            }

            self.arm_tick(&mut state, now_ms);
            (expired, granted)
        };

        if !expired.is_empty() {
            debug!(
                "Rate limiter {} expired {} waiting callbacks",
                self.config.name,
                expired.len()
            );
            self.counters
                .expired
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            for callback in expired {
                let waited_ms = now_ms.saturating_sub(callback.enqueued_at_ms());
                callback.fail(RateLimiterError::Expired {
                    name: self.config.name.clone(),
                    waited_ms,
                });
            }
        }

        self.counters
            .granted
            .fetch_add(granted.len() as u64, Ordering::Relaxed);
        for callback in granted {
            callback.succeed();
        }
    }

    /// Moves the limiter to its terminal state and fails everything waiting.
    ///
    /// Returns false if it was already closed.
    fn close(&self, error: RateLimiterError) -> bool {
        let drained = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(error.clone());
            state.next_tick = None;
            state.buffer.drain()
        };

        info!(
            "Rate limiter {} closed ({}), failing {} waiting callbacks",
            self.config.name,
            error,
            drained.len()
        );

        self.counters
            .cancelled
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        for callback in drained {
            callback.fail(error.clone());
        }
        true
    }
}

/// A smooth, callback-based rate limiter.
///
/// Create one through [`RateLimiterBuilder`](crate::RateLimiterBuilder), or
/// with [`RateLimiter::new`] when you already have a clock and a scheduler.
/// A new limiter has a zero rate: nothing is granted until
/// [`set_rate`](Self::set_rate) is called.
///
/// # Example
///
/// ```rust
/// use pacer::{ClockedExecutor, RateLimiterBuilder, UNLIMITED_BURST};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let executor = ClockedExecutor::new();
/// let limiter = RateLimiterBuilder::new()
///     .clocked_executor(&executor)
///     .build()
///     .unwrap();
/// limiter.set_rate(1.0, 10, UNLIMITED_BURST).unwrap();
///
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..3 {
///     let done = done.clone();
///     limiter
///         .submit(Box::new(move |result| {
///             assert!(result.is_ok());
///             done.fetch_add(1, Ordering::SeqCst);
///         }))
///         .unwrap();
/// }
///
/// assert_eq!(done.load(Ordering::SeqCst), 1);
/// executor.run_for(20);
/// assert_eq!(done.load(Ordering::SeqCst), 3);
/// ```
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    /// Creates a limiter running on `scheduler` and reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn new(
        config: RateLimiterConfig,
        clock: SharedClock,
        scheduler: SharedScheduler,
    ) -> Result<Self, RateLimiterError> {
        config.validate()?;

        let now_ms = clock.now_ms();
        let buffer = PermitBuffer::new(
            config.max_buffered,
            config.overflow_policy,
            config.buffer_ttl_ms,
        );

        let inner = Arc::new_cyclic(|this| Inner {
            state: Mutex::new(LimiterState {
                rate: Rate::ZERO,
                permits: 0.0,
                last_refill_ms: now_ms,
                buffer,
                next_tick: None,
                generation: 0,
                closed: None,
            }),
            config,
            clock,
            scheduler,
            counters: Counters::default(),
            overflow_log: RateLimitedLog::new(OVERFLOW_LOG_INTERVAL_MS),
            this: this.clone(),
        });

        debug!("Created rate limiter {}", inner.config.name);
        Ok(Self { inner })
    }

    /// Submits a callback; see [`AsyncRateLimiter::submit`].
    pub fn submit(&self, callback: Completion) -> Result<(), RateLimiterError> {
        self.inner.submit(callback)
    }

    /// Changes the rate to `events_per_period` every `period_ms`, at most
    /// `burst` at once.
    ///
    /// Takes effect immediately: waiting callbacks that the new rate allows
    /// are granted by a tick scheduled right away.
    ///
    /// # Errors
    ///
    /// [`RateLimiterError::InvalidRate`] if the rate cannot be represented;
    /// the previous rate stays in force.
    pub fn set_rate(&self, events_per_period: f64, period_ms: u64, burst: u32) -> Result<(), RateLimiterError> {
        let rate = Rate::new(events_per_period, period_ms, burst)?;
        self.inner.set_rate(rate);
        Ok(())
    }

    /// Fails every waiting callback with `RateLimiterError::Cancelled(cause)`.
    ///
    /// Callbacks submitted afterwards fail immediately with the same error.
    /// Calling it again has no effect besides a warning.
    pub fn cancel_all(&self, cause: Cause) {
        if !self.inner.close(RateLimiterError::Cancelled(cause)) {
            warn!(
                "cancel_all called more than once on rate limiter {}",
                self.inner.config.name
            );
        }
    }

    /// Fails every waiting callback with `RateLimiterError::Shutdown` and
    /// stops the event loop. Does nothing if already cancelled or shut down.
    pub fn shutdown(&self) {
        self.inner.close(RateLimiterError::Shutdown {
            name: self.inner.config.name.clone(),
        });
    }

    /// True once cancelled or shut down.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed.is_some()
    }

    /// Rate currently in force.
    pub fn rate(&self) -> Rate {
        self.inner.state.lock().rate
    }

    /// Callbacks waiting for a permit.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    /// Permits on hand as of the last accounting.
    pub fn available_permits(&self) -> f64 {
        self.inner.state.lock().permits
    }

    /// Limiter name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration the limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.inner.config
    }

    pub(crate) fn scheduler(&self) -> &SharedScheduler {
        &self.inner.scheduler
    }

    /// Snapshot of counters and current state.
    pub fn metrics(&self) -> RateLimiterMetrics {
        let (rate, available_permits, pending) = {
            let state = self.inner.state.lock();
            (state.rate, state.permits, state.buffer.len())
        };
        let counters = &self.inner.counters;

        RateLimiterMetrics {
            name: self.inner.config.name.clone(),
            rate,
            available_permits,
            pending,
            max_buffered: self.inner.config.max_buffered,
            total_granted: counters.granted.load(Ordering::Relaxed),
            total_rejected: counters.rejected.load(Ordering::Relaxed),
            total_expired: counters.expired.load(Ordering::Relaxed),
            total_evicted: counters.evicted.load(Ordering::Relaxed),
            total_cancelled: counters.cancelled.load(Ordering::Relaxed),
            total_ticks: counters.ticks.load(Ordering::Relaxed),
        }
    }
}

impl AsyncRateLimiter for RateLimiter {
    fn submit(&self, callback: Completion) -> Result<(), RateLimiterError> {
        RateLimiter::submit(self, callback)
    }

    fn set_rate(&self, events_per_period: f64, period_ms: u64, burst: u32) -> Result<(), RateLimiterError> {
        RateLimiter::set_rate(self, events_per_period, period_ms, burst)
    }

    fn cancel_all(&self, cause: Cause) {
        RateLimiter::cancel_all(self, cause)
    }

    fn rate(&self) -> Rate {
        RateLimiter::rate(self)
    }

    fn pending(&self) -> usize {
        RateLimiter::pending(self)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        // Waiting callbacks are failed rather than silently dropped.
        self.inner.close(RateLimiterError::Shutdown {
            name: self.inner.config.name.clone(),
        });
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RateLimiter")
            .field("name", &self.inner.config.name)
            .field("rate", &state.rate)
            .field("available_permits", &state.permits)
            .field("pending", &state.buffer.len())
            .field("closed", &state.closed.is_some())
            .finish()
    }
}
