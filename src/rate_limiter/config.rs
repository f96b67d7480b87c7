//! # Rate Limiter Configuration
//!
//! Settings that stay fixed for the lifetime of a limiter. The rate itself
//! is not here: it changes at runtime through `set_rate`.
//!
//! ```text
//!     ┌──────────────────────────────────────┐
//!     │ name: "downstream-x"                 │ ← shows up in logs and errors
//!     │ max_buffered: 1024                   │ ← waiting callbacks
//!     │ overflow_policy: Reject              │ ← what a full buffer does
//!     │ buffer_ttl_ms: Some(5_000)           │ ← how long a callback may wait
//!     └──────────────────────────────────────┘
//! ```

use super::error::RateLimiterError;

/// Default number of callbacks a limiter will hold while waiting for permits.
pub const DEFAULT_MAX_BUFFERED: usize = 1024;

/// What a full buffer does with the next callback.
///
/// ```text
///     Reject ──────────────► submit() returns CapacityExceeded
///     DropOldest ──────────► oldest waiter fails with Evicted, newcomer queued
///     ScheduleWithWarning ─► newcomer queued anyway, warning logged,
///                            next tick lets the excess through
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Refuse the new callback.
    #[default]
    Reject,
    /// Fail the oldest waiting callback to make room.
    DropOldest,
    /// Accept the callback and run the overflow without waiting for permits.
    ScheduleWithWarning,
}

/// Configuration for a [`RateLimiter`](super::RateLimiter).
///
/// ## Examples
///
/// ```rust
/// use pacer::{OverflowPolicy, RateLimiterConfig};
///
/// let config = RateLimiterConfig::named("search")
///     .with_max_buffered(256)
///     .with_overflow_policy(OverflowPolicy::DropOldest)
///     .with_buffer_ttl_ms(2_000);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Label used in logs and error messages.
    pub name: String,

    /// Maximum callbacks held while waiting for a permit.
    ///
    /// Zero means "never wait": a submit without an available permit goes
    /// straight to the overflow policy.
    pub max_buffered: usize,

    /// Behaviour once `max_buffered` callbacks are waiting.
    pub overflow_policy: OverflowPolicy,

    /// How long a callback may wait before it fails with `Expired`.
    ///
    /// `None` lets callbacks wait indefinitely.
    pub buffer_ttl_ms: Option<u64>,
}

impl Default for RateLimiterConfig {
    /// Default values:
    /// - name `"rate-limiter"`
    /// - 1024 buffered callbacks
    /// - reject when full
    /// - no TTL
    fn default() -> Self {
        Self {
            name: "rate-limiter".to_string(),
            max_buffered: DEFAULT_MAX_BUFFERED,
            overflow_policy: OverflowPolicy::Reject,
            buffer_ttl_ms: None,
        }
    }
}

impl RateLimiterConfig {
    /// Creates a configuration with explicit values.
    pub fn new(
        name: impl Into<String>,
        max_buffered: usize,
        overflow_policy: OverflowPolicy,
        buffer_ttl_ms: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            max_buffered,
            overflow_policy,
            buffer_ttl_ms,
        }
    }

    /// Default configuration with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the buffer size.
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }

    /// Sets the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Sets the time a callback may wait for a permit.
    pub fn with_buffer_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.buffer_ttl_ms = Some(ttl_ms);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimiterError::InvalidConfig`] if:
    /// - `name` is empty
    /// - `buffer_ttl_ms` is `Some(0)`
    /// - `max_buffered` is 0 with `ScheduleWithWarning`, which would run
    ///   every callback unthrottled
    ///
    /// # Example
    ///
    /// ```rust
    /// use pacer::RateLimiterConfig;
    ///
    /// let config = RateLimiterConfig::named("");
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), RateLimiterError> {
        if self.name.is_empty() {
            return Err(RateLimiterError::InvalidConfig("name must not be empty"));
        }

        if self.buffer_ttl_ms == Some(0) {
            return Err(RateLimiterError::InvalidConfig(
                "buffer_ttl_ms must be greater than 0 when set",
            ));
        }

        if self.max_buffered == 0 && self.overflow_policy == OverflowPolicy::ScheduleWithWarning {
            return Err(RateLimiterError::InvalidConfig(
                "ScheduleWithWarning requires max_buffered greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_buffered, DEFAULT_MAX_BUFFERED);
        assert_eq!(config.overflow_policy, OverflowPolicy::Reject);
        assert_eq!(config.buffer_ttl_ms, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = RateLimiterConfig::named("db")
            .with_max_buffered(16)
            .with_overflow_policy(OverflowPolicy::DropOldest)
            .with_buffer_ttl_ms(500);

        assert_eq!(config.name, "db");
        assert_eq!(config.max_buffered, 16);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.buffer_ttl_ms, Some(500));
        assert_eq!(
            config,
            RateLimiterConfig::new("db", 16, OverflowPolicy::DropOldest, Some(500))
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimiterConfig::named("").validate().is_err());
        assert!(RateLimiterConfig::default()
            .with_buffer_ttl_ms(0)
            .validate()
            .is_err());
        assert!(RateLimiterConfig::default()
            .with_max_buffered(0)
            .with_overflow_policy(OverflowPolicy::ScheduleWithWarning)
            .validate()
            .is_err());

        // Zero buffer is fine when rejecting or evicting.
        assert!(RateLimiterConfig::default()
            .with_max_buffered(0)
            .validate()
            .is_ok());
    }
}
