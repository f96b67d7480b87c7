//! Dual-read monitor configuration.

use super::error::DualReadError;

/// How long an unmatched report is kept before it counts as divergence.
pub const DEFAULT_ENTRY_TTL_MS: u64 = 30_000;

/// Keys tracked at once before the oldest are pushed out.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5_000;

/// Minimum spacing between throttled divergence logs.
pub const DEFAULT_DIVERGENCE_LOG_INTERVAL_MS: u64 = 10_000;

/// Settings for a [`DualReadMonitor`](super::DualReadMonitor).
///
/// ```rust
/// use pacer::DualReadConfig;
///
/// let config = DualReadConfig::default()
///     .with_entry_ttl_ms(60_000)
///     .with_max_entries(50_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualReadConfig {
    /// Age after which a report without a counterpart is evicted.
    pub entry_ttl_ms: u64,

    /// Upper bound on tracked keys.
    pub max_entries: usize,

    /// Interval used by [`start_sweeper`](super::DualReadMonitor::start_sweeper).
    pub sweep_interval_ms: u64,

    /// Minimum spacing of divergence logs for URI properties, which change
    /// far more often than cluster or service properties.
    pub divergence_log_interval_ms: u64,
}

impl Default for DualReadConfig {
    fn default() -> Self {
        Self {
            entry_ttl_ms: DEFAULT_ENTRY_TTL_MS,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            divergence_log_interval_ms: DEFAULT_DIVERGENCE_LOG_INTERVAL_MS,
        }
    }
}

impl DualReadConfig {
    /// Sets the entry TTL.
    pub fn with_entry_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.entry_ttl_ms = ttl_ms;
        self
    }

    /// Sets the tracked key limit.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = interval_ms;
        self
    }

    /// Sets the divergence log throttle.
    pub fn with_divergence_log_interval_ms(mut self, interval_ms: u64) -> Self {
        self.divergence_log_interval_ms = interval_ms;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`DualReadError::InvalidConfig`] when any value is zero.
    pub fn validate(&self) -> Result<(), DualReadError> {
        if self.entry_ttl_ms == 0 {
            return Err(DualReadError::InvalidConfig("entry_ttl_ms must be greater than 0"));
        }
        if self.max_entries == 0 {
            return Err(DualReadError::InvalidConfig("max_entries must be greater than 0"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(DualReadError::InvalidConfig("sweep_interval_ms must be greater than 0"));
        }
        Ok(())
    }
}
