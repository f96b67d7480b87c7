//! # Rate Limiter Module
//!
//! The callback-based rate limiter and everything it is built from.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (module organization)
//!     ├── buffer.rs       (FIFO of waiting callbacks, overflow policy, TTL)
//!     ├── config.rs       (limiter settings and validation)
//!     ├── core.rs         (permit accounting and the tick loop)
//!     ├── error.rs        (failure kinds delivered to callers)
//!     ├── metrics.rs      (snapshots and health)
//!     ├── ramp.rs         (stepwise rate changes)
//!     ├── rate.rs         (integer approximation of a rate)
//!     ├── scheduler.rs    (timed task execution, real and simulated)
//!     └── utils.rs        (clocks and log throttling)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     submit(callback)
//!          │
//!          ▼
//!     ┌──────────────┐   set_rate   ┌──────┐
//!     │ RateLimiter  │ ◄─────────── │ Rate │ ◄── RampUpRateLimiter steps
//!     └──────┬───────┘              └──────┘
//!            │ no permit
//!            ▼
//!     ┌──────────────┐   tick   ┌───────────┐
//!     │ PermitBuffer │ ◄─────── │ Scheduler │ ◄── Clock
//!     └──────────────┘          └───────────┘
//! ```

mod buffer;
mod config;
mod core;
mod error;
mod metrics;
mod ramp;
mod rate;
mod scheduler;
mod utils;

/// Waiting callbacks and their overflow outcomes
pub use buffer::{Completion, Enqueued, PendingCallback, PermitBuffer};

/// Limiter settings
pub use config::{OverflowPolicy, RateLimiterConfig, DEFAULT_MAX_BUFFERED};

/// The limiter and the trait shared with the ramp controller
pub use self::core::{AsyncRateLimiter, RateLimiter};

/// Failure kinds
pub use error::{Cause, RateLimiterError};

/// Snapshots and health
pub use metrics::{HealthStatus, RateLimiterMetrics};

/// Stepwise rate changes
pub use ramp::RampUpRateLimiter;

/// Rate approximation
pub use rate::{Rate, MAX_PERIOD_MS, MIN_PERIOD_MS, UNLIMITED_BURST};

/// Task scheduling
pub use scheduler::{ClockedExecutor, Scheduler, SharedScheduler, Task, ThreadScheduler};

/// Clocks and log throttling
pub use utils::{current_time_ms, Clock, ManualClock, RateLimitedLog, SharedClock, SystemClock};
