//! Snapshot metrics and health assessment for a rate limiter.
//!
//! ```text
//!     Metrics Dashboard:
//!     ┌─────────────────────────────────────┐
//!     │  Rate: 10/1000ms                    │
//!     │  Buffer: ▓▓▓▓▓▓░░░░░░░░  (410/1024) │
//!     │  Granted 9 812   Failed 31          │
//!     │  Health: ⚠️ Degraded                 │
//!     └─────────────────────────────────────┘
//! ```

use super::rate::Rate;
use std::fmt;

/// A point-in-time view of a limiter.
///
/// Counters are lifetime totals; `pending` and `available_permits` describe
/// the moment the snapshot was taken.
///
/// ## Example
///
/// ```rust
/// use pacer::{ClockedExecutor, RateLimiterBuilder};
/// use std::sync::Arc;
///
/// let executor = ClockedExecutor::new();
/// let limiter = RateLimiterBuilder::new()
///     .name("reports")
///     .clocked_executor(&executor)
///     .build()
///     .unwrap();
///
/// let metrics = limiter.metrics();
/// assert_eq!(metrics.pending, 0);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiterMetrics {
    /// Limiter name.
    pub name: String,

    /// Rate in force.
    pub rate: Rate,

    /// Permits available as of the last accounting.
    pub available_permits: f64,

    /// Callbacks waiting for a permit.
    pub pending: usize,

    /// Configured buffer size.
    pub max_buffered: usize,

    /// Callbacks that received a permit.
    pub total_granted: u64,

    /// Submissions refused because the buffer was full.
    pub total_rejected: u64,

    /// Callbacks failed after outliving the buffer TTL.
    pub total_expired: u64,

    /// Callbacks pushed out under the drop-oldest policy.
    pub total_evicted: u64,

    /// Callbacks failed by cancel or shutdown.
    pub total_cancelled: u64,

    /// Ticks executed.
    pub total_ticks: u64,
}

impl RateLimiterMetrics {
    /// All callbacks that ended in an error, plus rejected submissions.
    #[inline]
    pub fn total_failed(&self) -> u64 {
        self.total_rejected + self.total_expired + self.total_evicted + self.total_cancelled
    }

    /// Fraction of finished submissions that were granted (1.0 with no traffic).
    pub fn success_rate(&self) -> f64 {
        let total = self.total_granted + self.total_failed();
        if total == 0 {
            1.0
        } else {
            self.total_granted as f64 / total as f64
        }
    }

    /// How full the buffer is, from 0.0 to 1.0 (above 1.0 when overflowing
    /// under `ScheduleWithWarning`).
    pub fn buffer_utilization(&self) -> f64 {
        if self.max_buffered == 0 {
            if self.pending == 0 {
                0.0
            } else {
                1.0
            }
        } else {
            self.pending as f64 / self.max_buffered as f64
        }
    }

    /// Callers are waiting and no permit is on hand.
    #[inline]
    pub fn is_under_pressure(&self) -> bool {
        self.pending > 0 && self.available_permits < 1.0
    }

    /// Health classification.
    ///
    /// - **Critical**: the buffer is full, new callers are being turned away
    /// - **Degraded**: the buffer is at least half full or fewer than half of
    ///   the submissions succeed
    /// - **Healthy**: otherwise
    pub fn health_status(&self) -> HealthStatus {
        let utilization = self.buffer_utilization();
        if utilization >= 1.0 {
            HealthStatus::Critical
        } else if utilization >= 0.5 || self.success_rate() < 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Human-readable report.
    ///
    /// ```text
    /// RateLimiter Metrics (search):
    /// ├─ Rate: 10/1000ms
    /// ├─ Buffer:
    /// │  ├─ Pending: 3/1024
    /// │  └─ Available Permits: 0.40
    /// ├─ Counters:
    /// │  ├─ Granted: 120
    /// │  ├─ Rejected: 0
    /// │  ├─ Expired: 2
    /// │  ├─ Evicted: 0
    /// │  ├─ Cancelled: 0
    /// │  └─ Ticks: 118
    /// └─ Health: ✅ Healthy
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "RateLimiter Metrics ({}):\n\
             ├─ Rate: {}\n\
             ├─ Buffer:\n\
             │  ├─ Pending: {}/{}\n\
             │  └─ Available Permits: {:.2}\n\
             ├─ Counters:\n\
             │  ├─ Granted: {}\n\
             │  ├─ Rejected: {}\n\
             │  ├─ Expired: {}\n\
             │  ├─ Evicted: {}\n\
             │  ├─ Cancelled: {}\n\
             │  └─ Ticks: {}\n\
             └─ Health: {}",
            self.name,
            self.rate,
            self.pending,
            self.max_buffered,
            self.available_permits,
            self.total_granted,
            self.total_rejected,
            self.total_expired,
            self.total_evicted,
            self.total_cancelled,
            self.total_ticks,
            self.health_status()
        )
    }
}

impl fmt::Display for RateLimiterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Three-level health indicator.
///
/// ```text
///     Healthy ──────► buffer mostly empty
///        │
///     Degraded ─────► buffer filling up or many failures
///        │
///     Critical ─────► buffer full, submissions being refused
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Backlog building; still serving.
    Degraded,
    /// Backlog at capacity.
    Critical,
}

impl HealthStatus {
    /// True for anything but `Healthy`.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Operator guidance for the status.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::Healthy => "No action needed",
            Self::Degraded => "Monitor closely, consider raising the rate or shedding load",
            Self::Critical => "Immediate action required: raise the rate or reduce load",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "✅ Healthy"),
            Self::Degraded => write!(f, "⚠️ Degraded"),
            Self::Critical => write!(f, "🔴 Critical"),
        }
    }
}
