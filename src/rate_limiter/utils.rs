//! # Time Sources (utils.rs)
//!
//! Everything in this crate that needs "now" asks a [`Clock`]. Production code
//! uses [`SystemClock`]; tests swap in a [`ManualClock`] or a
//! [`ClockedExecutor`](super::ClockedExecutor) and move time forward by hand.
//!
//! ```text
//!     SystemClock ───► epoch ms captured once, advanced by a monotonic Instant
//!     ManualClock ───► whatever the test last set
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch milliseconds at first use, advanced with a monotonic Instant
// so a system clock jump never moves "now" backwards.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// Returns the current time in milliseconds since UNIX epoch.
///
/// Millisecond precision is all the limiter and the monitor need.
///
/// # Example
///
/// ```rust
/// use pacer::current_time_ms;
///
/// let now = current_time_ms();
/// assert!(now > 0);
/// ```
#[inline(always)]
pub fn current_time_ms() -> u64 {
    let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        (Instant::now(), epoch_ms)
    });
    base_ms.saturating_add(start.elapsed().as_millis() as u64)
}

/// A source of millisecond timestamps.
///
/// Implementations must never go backwards.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The process clock, backed by [`current_time_ms`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep one handle and pass
/// another to the code under test.
///
/// # Example
///
/// ```rust
/// use pacer::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(250);
/// assert_eq!(clock.now_ms(), 1_250);
/// ```
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock reading `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves time forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }

    /// Sets the time, ignoring values earlier than the current reading.
    pub fn set(&self, now_ms: u64) {
        self.now.fetch_max(now_ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now_ms", &self.now_ms())
            .finish()
    }
}

/// Lets one log line through per interval.
///
/// Hot paths (a buffer stuck over capacity, a cluster whose URIs keep
/// diverging) would otherwise flood the log.
///
/// ```rust
/// use pacer::RateLimitedLog;
///
/// let log = RateLimitedLog::new(10_000);
/// assert!(log.should_log(50_000));
/// assert!(!log.should_log(55_000));
/// assert!(log.should_log(60_000));
/// ```
pub struct RateLimitedLog {
    interval_ms: u64,
    // u64::MAX until the first line is logged
    last_logged_ms: AtomicU64,
}

impl RateLimitedLog {
    /// Creates a throttle allowing one line every `interval_ms`.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_logged_ms: AtomicU64::new(u64::MAX),
        }
    }

    /// Returns true if the caller should log now, and records it.
    pub fn should_log(&self, now_ms: u64) -> bool {
        let last = self.last_logged_ms.load(Ordering::Relaxed);
        if last != u64::MAX && now_ms.saturating_sub(last) < self.interval_ms {
            return false;
        }
        self.last_logged_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl fmt::Debug for RateLimitedLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedLog")
            .field("interval_ms", &self.interval_ms)
            .finish()
    }
}
