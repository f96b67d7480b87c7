//! # Dual-Read Module
//!
//! Consistency checking for a live migration between two service discovery
//! backends.
//!
//! ## Module Structure
//!
//! ```text
//!     dual_read/
//!     ├── mod.rs          (module organization)
//!     ├── config.rs       (TTL, size limit, sweep interval)
//!     ├── error.rs        (setup errors)
//!     ├── metrics.rs      (stats snapshot)
//!     ├── mode.rs         (global and per-key read modes)
//!     ├── monitor.rs      (per-key comparison of old and new reports)
//!     ├── property.rs     (cluster, service and URI properties)
//!     └── similarity.rs   (host list similarity gauge)
//! ```
//!
//! ## Flow
//!
//! ```text
//!     old backend ──┐                        ┌──► match / mismatch counters
//!                   ├──► DualReadMonitor ────┼──► TTL divergence (sweeper)
//!     new backend ──┘         │              └──► URI similarity gauge
//!                             ▼
//!                         ReadModes (skip keys not in DUAL_READ)
//! ```

mod config;
mod error;
mod metrics;
mod mode;
mod monitor;
mod property;
mod similarity;

pub use config::{
    DualReadConfig, DEFAULT_DIVERGENCE_LOG_INTERVAL_MS, DEFAULT_ENTRY_TTL_MS, DEFAULT_MAX_ENTRIES,
    DEFAULT_SWEEP_INTERVAL_MS,
};
pub use error::DualReadError;
pub use metrics::DualReadStats;
pub use mode::{DualReadMode, ReadModes};
pub use monitor::{DualReadMonitor, VERSION_FROM_FS};
pub use property::{
    ClusterProperties, MonitoredProperty, PropertyKind, ServiceProperties, UriData, UriProperties,
};
pub use similarity::UriSimilarity;

/// Monitor for cluster properties.
pub type ClusterPropertiesMonitor = DualReadMonitor<ClusterProperties>;

/// Monitor for service properties.
pub type ServicePropertiesMonitor = DualReadMonitor<ServiceProperties>;

/// Monitor for URI properties, feeding the similarity gauge.
pub type UriPropertiesMonitor = DualReadMonitor<UriProperties>;
