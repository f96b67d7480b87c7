//! # Rate
//!
//! Converts a fractional "events per period" request into an integer
//! `(events, period_ms)` pair the limiter can hand out permits against.
//!
//! ```text
//!     requested 2.5 / 1000ms
//!          │
//!          ▼
//!     2.5 / 1000   round → 3/1000   error 20% ✗
//!     5   / 2000   round → 5/2000   error  0% ✓
//! ```
//!
//! Doubling stops once the integer ratio is within 1% of the request, when
//! the period would pass [`MAX_PERIOD_MS`], or when the events would pass the
//! burst.

use super::error::RateLimiterError;
use std::fmt;

/// Burst value meaning "no limit on permits per period".
pub const UNLIMITED_BURST: u32 = u32::MAX;

/// Shortest period a rate may use.
pub const MIN_PERIOD_MS: u64 = 1;

/// Longest period a rate may grow to while searching for precision (24h).
pub const MAX_PERIOD_MS: u64 = 24 * 60 * 60 * 1000;

/// Largest accepted relative error between the requested and the achieved ratio.
const PRECISION: f64 = 0.01;

/// An immutable permit rate: `events` permits every `period_ms` milliseconds,
/// never more than `burst` at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    events: u32,
    period_ms: u64,
    burst: u32,
    requested_events: f64,
    requested_period_ms: u64,
}

impl Rate {
    /// A rate that never issues permits.
    pub const ZERO: Rate = Rate {
        events: 0,
        period_ms: 1000,
        burst: UNLIMITED_BURST,
        requested_events: 0.0,
        requested_period_ms: 1000,
    };

    /// Computes the closest integer rate for `events_per_period` every `period_ms`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimiterError::InvalidRate`] when an argument is out of
    /// range, when the burst would force a period under one millisecond, or
    /// when the rate is too slow to express within [`MAX_PERIOD_MS`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use pacer::{Rate, UNLIMITED_BURST};
    ///
    /// let rate = Rate::new(3.0, 1000, 1).unwrap();
    /// assert_eq!((rate.events(), rate.period_ms()), (1, 333));
    ///
    /// let rate = Rate::new(0.05, 1000, UNLIMITED_BURST).unwrap();
    /// assert_eq!((rate.events(), rate.period_ms()), (1, 20_000));
    /// ```
    pub fn new(events_per_period: f64, period_ms: u64, burst: u32) -> Result<Self, RateLimiterError> {
        if !events_per_period.is_finite() || events_per_period < 0.0 {
            return Err(RateLimiterError::InvalidRate(format!(
                "events per period must be a finite non-negative number, got {}",
                events_per_period
            )));
        }
        if period_ms < MIN_PERIOD_MS {
            return Err(RateLimiterError::InvalidRate(
                "period must be at least one millisecond".to_string(),
            ));
        }
        if burst == 0 {
            return Err(RateLimiterError::InvalidRate(
                "burst must be greater than 0".to_string(),
            ));
        }

        if events_per_period == 0.0 {
            return Ok(Self {
                events: 0,
                period_ms,
                burst,
                requested_events: 0.0,
                requested_period_ms: period_ms,
            });
        }

        let target = events_per_period / period_ms as f64;
        let mut events = events_per_period;
        let mut period = period_ms as f64;

        if burst != UNLIMITED_BURST && events > burst as f64 {
            period = period * burst as f64 / events;
            events = burst as f64;
            if period < MIN_PERIOD_MS as f64 {
                return Err(RateLimiterError::InvalidRate(format!(
                    "{} events per {}ms cannot be issued with a burst of {}",
                    events_per_period, period_ms, burst
                )));
            }
        }

        if events < 1.0 {
            period /= events;
            events = 1.0;
        }

        if period.round() > MAX_PERIOD_MS as f64 {
            return Err(RateLimiterError::InvalidRate(format!(
                "{} events per {}ms is slower than one event per {}ms",
                events_per_period, period_ms, MAX_PERIOD_MS
            )));
        }

        while relative_error(events.round() / period.round(), target) >= PRECISION {
            let next_events = events * 2.0;
            let next_period = period * 2.0;
            if next_period.round() > MAX_PERIOD_MS as f64 || next_events.round() > burst as f64 {
                break;
            }
            events = next_events;
            period = next_period;
        }

        Ok(Self {
            events: events.round() as u32,
            period_ms: period.round() as u64,
            burst,
            requested_events: events_per_period,
            requested_period_ms: period_ms,
        })
    }

    /// Permits issued per period.
    #[inline]
    pub fn events(&self) -> u32 {
        self.events
    }

    /// Period length in milliseconds.
    #[inline]
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Maximum permits issued at once.
    #[inline]
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// The events per period originally asked for.
    #[inline]
    pub fn requested_events(&self) -> f64 {
        self.requested_events
    }

    /// The period originally asked for.
    #[inline]
    pub fn requested_period_ms(&self) -> u64 {
        self.requested_period_ms
    }

    /// True when the rate never issues permits.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.events == 0
    }

    /// Achieved permits per millisecond.
    #[inline]
    pub fn permits_per_ms(&self) -> f64 {
        self.events as f64 / self.period_ms as f64
    }

    /// Achieved permits per second.
    pub fn events_per_second(&self) -> f64 {
        self.permits_per_ms() * 1000.0
    }

    /// The most permits the bucket holds at once.
    #[inline]
    pub(crate) fn capacity(&self) -> f64 {
        self.events.min(self.burst) as f64
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.burst == UNLIMITED_BURST {
            write!(f, "{}/{}ms", self.events, self.period_ms)
        } else {
            write!(f, "{}/{}ms (burst {})", self.events, self.period_ms, self.burst)
        }
    }
}

fn relative_error(achieved: f64, target: f64) -> f64 {
    ((achieved - target) / target).abs()
}
