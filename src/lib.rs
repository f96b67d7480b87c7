//! # Pacer - Smooth Callback Rate Limiting and Dual-Read Monitoring
//!
//! Pacer paces work without blocking threads. Instead of asking "may I go
//! now?", callers hand the limiter a callback and the limiter runs it the
//! moment a permit is available, in arrival order, at exactly the configured
//! rate. Rates can change at any time, instantly or in gradual steps.
//!
//! The crate also ships the dual-read monitor used while migrating between
//! two service discovery backends: it compares what each backend reports per
//! key and turns disagreements into logs, counters and a similarity gauge.
//!
//! ## The Smooth Token Bucket
//!
//! ```text
//!     Rate 3/1000ms, permits trickle in one every ~333ms:
//!
//!     t=0     [●●●]  submit A ✅  submit B ✅  submit C ✅  submit D ⏳
//!     t=333   [●  ]  tick ──► D ✅
//!     t=400   [   ]  submit E ⏳
//!     t=666   [●  ]  tick ──► E ✅
//! ```
//!
//! - **Permit** = permission to run one callback
//! - **Buffer** = callbacks waiting for a permit, oldest first
//! - **Tick** = scheduled only while callbacks wait, grants as many as the
//!   accumulated permits allow
//!
//! ## Features
//!
//! - ⏱️ **Non-blocking** - `submit` returns immediately, the callback runs later
//! - 🎯 **Precise rates** - fractional rates such as 0.05/s or 2.5/s become exact integer schedules
//! - 🔄 **Live rate changes** - instantly or ramped in bounded steps
//! - 🧺 **Bounded buffering** - reject, drop the oldest, or let the overflow through
//! - ⌛ **TTL expiry** - callbacks that waited too long fail instead of running late
//! - 🧪 **Deterministic testing** - drive time with `ClockedExecutor`
//! - 🔍 **Dual-read monitoring** - match, mismatch and divergence tracking across two backends
//!
//! ## Quick Start
//!
//! ### Pacing callbacks
//!
//! ```rust
//! use pacer::{RateLimiterBuilder, UNLIMITED_BURST};
//!
//! let limiter = RateLimiterBuilder::new()
//!     .name("downstream")
//!     .rate(10.0, 1000, UNLIMITED_BURST)   // 10 per second
//!     .build()
//!     .unwrap();
//!
//! limiter
//!     .submit(Box::new(|result| match result {
//!         Ok(()) => println!("✅ permit granted - calling downstream"),
//!         Err(err) => println!("⛔ gave up: {}", err),
//!     }))
//!     .unwrap();
//! ```
//!
//! ### Ramping up
//!
//! ```rust
//! use pacer::RateLimiterBuilder;
//!
//! let limiter = RateLimiterBuilder::new().build_ramp_up().unwrap();
//!
//! // Climb to 100/s by at most 20/s each second.
//! limiter.ramp_to(100.0, 1000, 100, 20.0).unwrap();
//! assert_eq!(limiter.rate().events(), 20);
//! ```
//!
//! ### Comparing two backends
//!
//! ```rust
//! use pacer::{DualReadConfig, ServiceProperties, ServicePropertiesMonitor, SystemClock};
//! use std::sync::Arc;
//!
//! let monitor = ServicePropertiesMonitor::new(DualReadConfig::default(), Arc::new(SystemClock))
//!     .unwrap();
//!
//! let props = ServiceProperties::default();
//! monitor.report_data("search", props.clone(), "12", false);
//! monitor.report_data("search", props, "12", true);
//! assert_eq!(monitor.stats().matches, 1);
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your Application      │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │ RateLimiter         │       │ DualReadMonitor<T>   │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • submit()          │       │ • report_data()      │
//!     │ • set_rate()        │       │ • evict_expired()    │
//!     │ • cancel_all()      │       │ • similarity()       │
//!     └──────────┬──────────┘       └───────────┬──────────┘
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │ Clock + Scheduler   │       │ Clock + ReadModes    │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity |
//! |-----------|----------------|
//! | submit() with a permit on hand | O(1) |
//! | submit() buffered | O(1) |
//! | tick | O(granted + expired) |
//! | set_rate() | O(1) |
//! | report_data() | O(1), O(uris) for URI properties |
//! | evict_expired() | O(tracked keys) |
//!
//! ## Thread Safety
//!
//! All types are thread-safe and can be shared across threads:
//! - `RateLimiter` - share via `Arc<RateLimiter>`; one mutex guards its state
//!   and callbacks always run outside of it
//! - `DualReadMonitor` - share via `Arc<DualReadMonitor<T>>`; different keys
//!   never contend
//!
//! ## Demos
//!
//! See the `demos/` directory:
//! - `basic.rs` - pacing, rate changes, ramping and metrics
//! - `dual_read.rs` - a simulated backend migration

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_op_in_unsafe_fn)]

// Internal modules
mod dual_read;
mod rate_limiter;

// Public re-exports
pub use dual_read::{
    ClusterProperties, ClusterPropertiesMonitor, DualReadConfig, DualReadError, DualReadMode,
    DualReadMonitor, DualReadStats, MonitoredProperty, PropertyKind, ReadModes, ServiceProperties,
    ServicePropertiesMonitor, UriData, UriProperties, UriPropertiesMonitor, UriSimilarity,
    DEFAULT_DIVERGENCE_LOG_INTERVAL_MS, DEFAULT_ENTRY_TTL_MS, DEFAULT_MAX_ENTRIES,
    DEFAULT_SWEEP_INTERVAL_MS, VERSION_FROM_FS,
};
pub use rate_limiter::{
    current_time_ms, AsyncRateLimiter, Cause, Clock, ClockedExecutor, Completion, Enqueued,
    HealthStatus, ManualClock, OverflowPolicy, PendingCallback, PermitBuffer, RampUpRateLimiter,
    Rate, RateLimitedLog, RateLimiter, RateLimiterConfig, RateLimiterError, RateLimiterMetrics,
    Scheduler, SharedClock, SharedScheduler, SystemClock, Task, ThreadScheduler,
    DEFAULT_MAX_BUFFERED, MAX_PERIOD_MS, MIN_PERIOD_MS, UNLIMITED_BURST,
};

use std::fmt;
use std::sync::Arc;

/// A rate limiter wrapped in `Arc` for convenient thread-safe sharing.
///
/// # Example
/// ```rust
/// use pacer::{RateLimiterBuilder, SharedRateLimiter, UNLIMITED_BURST};
/// use std::sync::Arc;
///
/// let shared: SharedRateLimiter = Arc::new(
///     RateLimiterBuilder::new()
///         .rate(100.0, 1000, UNLIMITED_BURST)
///         .build()
///         .unwrap(),
/// );
///
/// let limiter = shared.clone();
/// std::thread::spawn(move || {
///     let _ = limiter.submit(Box::new(|_| {}));
/// })
/// .join()
/// .unwrap();
/// ```
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Any limiter behind the common trait, shared.
pub type SharedAsyncRateLimiter = Arc<dyn AsyncRateLimiter>;

/// A dual-read monitor wrapped in `Arc`, as needed by
/// [`DualReadMonitor::start_sweeper`].
pub type SharedMonitor<T> = Arc<DualReadMonitor<T>>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// This crate requires at least Rust 1.70.0 due to:
/// - `std::sync::OnceLock`
/// - `#[default]` on enum variants
/// - Edition 2021 features
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// Import everything you need with a single line:
/// ```rust
/// use pacer::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical use.
    //!
    //! # Example
    //! ```rust
    //! use pacer::prelude::*;
    //!
    //! let config = RateLimiterConfig::named("search");
    //! let policy = OverflowPolicy::DropOldest;
    //! let status = HealthStatus::Healthy;
    //! let mode = DualReadMode::DualRead;
    //! ```

    pub use crate::{
        AsyncRateLimiter, ClockedExecutor, DualReadConfig, DualReadMode, DualReadMonitor,
        HealthStatus, OverflowPolicy, RampUpRateLimiter, Rate, RateLimiter, RateLimiterBuilder,
        RateLimiterConfig, RateLimiterError, RateLimiterMetrics, SharedMonitor, SharedRateLimiter,
        UNLIMITED_BURST,
    };
}

/// Builder pattern for creating rate limiters.
///
/// Without an explicit clock and scheduler the limiter reads the system clock
/// and runs its ticks on a dedicated background thread.
///
/// # Example
///
/// ```rust
/// use pacer::{OverflowPolicy, RateLimiterBuilder};
///
/// let limiter = RateLimiterBuilder::new()
///     .name("db-writes")
///     .max_buffered(256)
///     .overflow_policy(OverflowPolicy::DropOldest)
///     .buffer_ttl_ms(5_000)
///     .rate(50.0, 1000, 10)
///     .build()
///     .unwrap();
/// assert_eq!(limiter.rate().events(), 10);
///
/// // Invalid settings surface as errors.
/// let result = RateLimiterBuilder::new().name("").build();
/// assert!(result.is_err());
/// ```
#[derive(Clone)]
pub struct RateLimiterBuilder {
    config: RateLimiterConfig,
    clock: Option<SharedClock>,
    scheduler: Option<SharedScheduler>,
    rate: Option<(f64, u64, u32)>,
}

impl RateLimiterBuilder {
    /// Creates a builder with the default configuration and no rate.
    pub fn new() -> Self {
        Self {
            config: RateLimiterConfig::default(),
            clock: None,
            scheduler: None,
            rate: None,
        }
    }

    /// Starts from an existing configuration.
    pub fn with_config(config: RateLimiterConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Sets the name used in logs and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets how many callbacks may wait for a permit.
    pub fn max_buffered(mut self, max_buffered: usize) -> Self {
        self.config.max_buffered = max_buffered;
        self
    }

    /// Sets what a full buffer does.
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// Sets how long a callback may wait before failing with `Expired`.
    pub fn buffer_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.config.buffer_ttl_ms = Some(ttl_ms);
        self
    }

    /// Sets the initial rate. Without it the limiter grants nothing until
    /// `set_rate` is called.
    pub fn rate(mut self, events_per_period: f64, period_ms: u64, burst: u32) -> Self {
        self.rate = Some((events_per_period, period_ms, burst));
        self
    }

    /// Uses `clock` instead of the system clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `scheduler` instead of a dedicated thread.
    pub fn scheduler(mut self, scheduler: SharedScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Uses `executor` as both clock and scheduler.
    pub fn clocked_executor(self, executor: &ClockedExecutor) -> Self {
        self.clock(Arc::new(executor.clone()))
            .scheduler(Arc::new(executor.clone()))
    }

    /// Builds the limiter.
    ///
    /// # Errors
    ///
    /// - [`RateLimiterError::InvalidConfig`] if the configuration is invalid
    /// - [`RateLimiterError::InvalidRate`] if the initial rate is invalid
    /// - [`RateLimiterError::SchedulerStart`] if the default scheduler thread
    ///   cannot be spawned
    pub fn build(self) -> Result<RateLimiter, RateLimiterError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler: SharedScheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(
                ThreadScheduler::new(&self.config.name)
                    .map_err(|err| RateLimiterError::SchedulerStart(err.to_string()))?,
            ),
        };

        let limiter = RateLimiter::new(self.config, clock, scheduler)?;
        if let Some((events_per_period, period_ms, burst)) = self.rate {
            limiter.set_rate(events_per_period, period_ms, burst)?;
        }
        Ok(limiter)
    }

    /// Builds a limiter wrapped in a [`RampUpRateLimiter`].
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_ramp_up(self) -> Result<RampUpRateLimiter, RateLimiterError> {
        self.build().map(RampUpRateLimiter::new)
    }
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RateLimiterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("custom_scheduler", &self.scheduler.is_some())
            .field("rate", &self.rate)
            .finish()
    }
}
