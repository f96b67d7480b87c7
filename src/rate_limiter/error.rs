//! Error kinds produced by the rate limiter.
//!
//! Every failure a caller can observe is one variant of [`RateLimiterError`].
//! Capacity problems are returned synchronously from `submit`, everything
//! else reaches the caller through the callback it handed in.
//!
//! ```text
//!     submit() ──► Err(CapacityExceeded)          (never accepted)
//!         │
//!         ▼
//!     buffered ──► callback(Err(Expired))         (TTL elapsed)
//!              ──► callback(Err(Evicted))         (DropOldest overflow)
//!              ──► callback(Err(Cancelled(cause))) (cancel_all)
//!              ──► callback(Err(Shutdown))        (shutdown)
//!              ──► callback(Ok(()))               (permit granted)
//! ```

use std::error::Error as StdError;
use std::sync::Arc;

/// Caller supplied cancellation cause.
///
/// Stored and handed back as-is, so callers can compare it with
/// [`Arc::ptr_eq`] against the value they passed to `cancel_all`.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// All the ways a submission can fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimiterError {
    /// The buffer is full and the overflow policy rejects new callbacks.
    #[error("cannot submit callback because the buffer is full at {max_buffered} tasks for rate limiter {name}")]
    CapacityExceeded {
        /// Name of the limiter that rejected the callback.
        name: String,
        /// Configured buffer size.
        max_buffered: usize,
    },

    /// The callback waited longer than the configured buffer TTL.
    #[error("callback expired after waiting {waited_ms}ms in rate limiter {name}")]
    Expired {
        /// Name of the limiter that dropped the callback.
        name: String,
        /// Time spent in the buffer.
        waited_ms: u64,
    },

    /// The callback was the oldest entry of a full buffer under the drop-oldest policy.
    #[error("callback evicted by a newer submission to rate limiter {name}")]
    Evicted {
        /// Name of the limiter that evicted the callback.
        name: String,
    },

    /// `cancel_all` was called; carries the caller's cause unchanged.
    #[error("callback cancelled: {0}")]
    Cancelled(#[source] Cause),

    /// The limiter was shut down.
    #[error("rate limiter {name} has been shut down")]
    Shutdown {
        /// Name of the limiter.
        name: String,
    },

    /// The requested rate cannot be represented.
    #[error("invalid rate: {0}")]
    InvalidRate(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The default scheduler thread could not be started.
    #[error("failed to start scheduler thread: {0}")]
    SchedulerStart(String),
}

impl RateLimiterError {
    /// Returns the original cause for [`RateLimiterError::Cancelled`].
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Cancelled(cause) => Some(cause),
            _ => None,
        }
    }

    /// True for the error returned synchronously from `submit`.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// True when the callback timed out in the buffer.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// True when the limiter was cancelled or shut down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::Shutdown { .. })
    }
}
