//! # Ramp-Up Rate Limiter
//!
//! Wraps a [`RateLimiter`] and walks its rate toward a target in bounded
//! steps, one step per period, instead of jumping there at once.
//!
//! ```text
//!     events/period
//!        10 ┤                      ●──────── target
//!         8 ┤                ●─────┘
//!         6 ┤          ●─────┘
//!         4 ┤    ●─────┘
//!         2 ┤●───┘
//!           └┬─────┬─────┬─────┬─────┬────► time
//!            0     P     2P    3P    4P
//!
//!     ramp_to(10.0, P, burst, 2.0) starting from 0
//! ```
//!
//! A newer `ramp_to` supersedes a ramp in progress from its next step on,
//! and `set_rate` cancels it outright.
//! Ramping down works the same way.

use super::{
    buffer::Completion,
    core::{AsyncRateLimiter, RateLimiter},
    error::{Cause, RateLimiterError},
    metrics::RateLimiterMetrics,
    rate::Rate,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

struct RampState {
    /// Events per period currently applied to the wrapped limiter.
    current: f64,
    target: f64,
    period_ms: u64,
    burst: u32,
    step: f64,
    ramping: bool,
    generation: u64,
}

impl RampState {
    /// Next value on the way to the target, landing exactly on it.
    fn next_step(&self) -> f64 {
        if self.target > self.current {
            (self.current + self.step).min(self.target)
        } else {
            (self.current - self.step).max(self.target)
        }
    }
}

struct RampInner {
    limiter: RateLimiter,
    state: Mutex<RampState>,
    this: Weak<RampInner>,
}

impl RampInner {
    fn apply(&self, state: &RampState, events_per_period: f64) -> Result<(), RateLimiterError> {
        self.limiter
            .set_rate(events_per_period, state.period_ms, state.burst)
    }

    fn schedule_step(&self, state: &RampState) {
        let generation = state.generation;
        let this = self.this.clone();
        self.limiter.scheduler().schedule(
            state.period_ms,
            Box::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.step(generation);
                }
            }),
        );
    }

    fn step(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || !state.ramping {
            return;
        }

        let next = state.next_step();
        if let Err(err) = self.apply(&state, next) {
            warn!(
                "Rate limiter {} stopped ramping at {}/{}ms: {}",
                self.limiter.name(),
                state.current,
                state.period_ms,
                err
            );
            state.ramping = false;
            return;
        }

        state.current = next;
        if next == state.target {
            state.ramping = false;
            debug!(
                "Rate limiter {} reached {}/{}ms",
                self.limiter.name(),
                next,
                state.period_ms
            );
        } else {
            self.schedule_step(&state);
        }
    }
}

/// A [`RateLimiter`] whose rate changes are spread over several periods.
///
/// # Example
///
/// ```rust
/// use pacer::{ClockedExecutor, RampUpRateLimiter, RateLimiterBuilder};
///
/// let executor = ClockedExecutor::new();
/// let limiter = RampUpRateLimiter::new(
///     RateLimiterBuilder::new()
///         .clocked_executor(&executor)
///         .build()
///         .unwrap(),
/// );
///
/// limiter.ramp_to(10.0, 1000, 10, 2.0).unwrap();
/// assert_eq!(limiter.rate().events(), 2);
/// assert!(limiter.is_ramping());
///
/// executor.run_for(4000);
/// assert_eq!(limiter.rate().events(), 10);
/// assert!(!limiter.is_ramping());
/// ```
pub struct RampUpRateLimiter {
    inner: Arc<RampInner>,
}

impl RampUpRateLimiter {
    /// Wraps `limiter`, starting from the rate it currently has.
    pub fn new(limiter: RateLimiter) -> Self {
        let rate = limiter.rate();
        let current = if rate.is_zero() {
            0.0
        } else {
            rate.requested_events()
        };
        let period_ms = rate.requested_period_ms();

        let inner = Arc::new_cyclic(|this| RampInner {
            limiter,
            state: Mutex::new(RampState {
                current,
                target: current,
                period_ms,
                burst: rate.burst(),
                step: 0.0,
                ramping: false,
                generation: 0,
            }),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Moves toward `target` events per `period_ms`, by at most
    /// `step_per_period` each period.
    ///
    /// The first step applies immediately. A step that is not finite or not
    /// positive, or a target within one step, applies the target directly.
    /// The burst passed to the wrapped limiter is `min_burst`, raised to 1.
    ///
    /// # Errors
    ///
    /// [`RateLimiterError::InvalidRate`] if the target rate cannot be
    /// represented; nothing changes in that case.
    pub fn ramp_to(
        &self,
        target: f64,
        period_ms: u64,
        min_burst: u32,
        step_per_period: f64,
    ) -> Result<(), RateLimiterError> {
        let burst = min_burst.max(1);
        Rate::new(target, period_ms, burst)?;

        let mut state = self.inner.state.lock();
        state.generation += 1;

        if state.period_ms != period_ms && state.period_ms > 0 {
            state.current = state.current * period_ms as f64 / state.period_ms as f64;
        }
        state.target = target.max(0.0);
        state.period_ms = period_ms;
        state.burst = burst;
        state.step = step_per_period;

        let distance = (state.target - state.current).abs();
        let direct = !step_per_period.is_finite()
            || step_per_period <= 0.0
            || (distance / step_per_period).ceil() <= 1.0;

        let next = if direct {
            state.target
        } else {
            state.next_step()
        };
        self.inner.apply(&state, next)?;
        state.current = next;
        state.ramping = !direct;

        if direct {
            debug!(
                "Rate limiter {} set to {}/{}ms",
                self.inner.limiter.name(),
                next,
                period_ms
            );
        } else {
            debug!(
                "Rate limiter {} ramping to {}/{}ms in steps of {}, now at {}",
                self.inner.limiter.name(),
                state.target,
                period_ms,
                step_per_period,
                next
            );
            self.inner.schedule_step(&state);
        }
        Ok(())
    }

    /// Applies a rate directly, cancelling any ramp in progress.
    ///
    /// # Errors
    ///
    /// [`RateLimiterError::InvalidRate`] if the rate cannot be represented.
    pub fn set_rate(&self, events_per_period: f64, period_ms: u64, burst: u32) -> Result<(), RateLimiterError> {
        let mut state = self.inner.state.lock();
        self.inner
            .limiter
            .set_rate(events_per_period, period_ms, burst)?;

        state.generation += 1;
        state.current = events_per_period.max(0.0);
        state.target = state.current;
        state.period_ms = period_ms;
        state.burst = burst;
        state.ramping = false;
        Ok(())
    }

    /// Events per period the current ramp is heading for.
    pub fn target_rate(&self) -> f64 {
        self.inner.state.lock().target
    }

    /// True while steps remain to be applied.
    pub fn is_ramping(&self) -> bool {
        self.inner.state.lock().ramping
    }

    /// Submits a callback to the wrapped limiter.
    pub fn submit(&self, callback: Completion) -> Result<(), RateLimiterError> {
        self.inner.limiter.submit(callback)
    }

    /// Stops ramping and fails everything waiting with `Cancelled(cause)`.
    pub fn cancel_all(&self, cause: Cause) {
        self.stop_ramp();
        self.inner.limiter.cancel_all(cause);
    }

    /// Stops ramping and shuts the wrapped limiter down.
    pub fn shutdown(&self) {
        self.stop_ramp();
        self.inner.limiter.shutdown();
    }

    fn stop_ramp(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.ramping = false;
    }

    /// Rate currently applied to the wrapped limiter.
    pub fn rate(&self) -> Rate {
        self.inner.limiter.rate()
    }

    /// Callbacks waiting for a permit.
    pub fn pending(&self) -> usize {
        self.inner.limiter.pending()
    }

    /// Metrics of the wrapped limiter.
    pub fn metrics(&self) -> RateLimiterMetrics {
        self.inner.limiter.metrics()
    }

    /// The wrapped limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }
}

impl AsyncRateLimiter for RampUpRateLimiter {
    fn submit(&self, callback: Completion) -> Result<(), RateLimiterError> {
        RampUpRateLimiter::submit(self, callback)
    }

    fn set_rate(&self, events_per_period: f64, period_ms: u64, burst: u32) -> Result<(), RateLimiterError> {
        RampUpRateLimiter::set_rate(self, events_per_period, period_ms, burst)
    }

    fn cancel_all(&self, cause: Cause) {
        RampUpRateLimiter::cancel_all(self, cause)
    }

    fn rate(&self) -> Rate {
        RampUpRateLimiter::rate(self)
    }

    fn pending(&self) -> usize {
        RampUpRateLimiter::pending(self)
    }
}

impl fmt::Debug for RampUpRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RampUpRateLimiter")
            .field("limiter", &self.inner.limiter)
            .field("current", &state.current)
            .field("target", &state.target)
            .field("period_ms", &state.period_ms)
            .field("ramping", &state.ramping)
            .finish()
    }
}
