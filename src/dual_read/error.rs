//! Errors raised while setting up a dual-read monitor.
//!
//! Reports themselves never fail: disagreements between the two sources
//! surface as logs and counters, not as errors.

/// Monitor setup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DualReadError {
    /// A configuration value failed validation.
    #[error("invalid dual-read configuration: {0}")]
    InvalidConfig(&'static str),

    /// The background sweeper thread could not be started.
    #[error("failed to start dual-read sweeper: {0}")]
    SweeperStart(String),
}
