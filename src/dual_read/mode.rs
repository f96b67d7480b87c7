//! Read modes for the migration between the old and the new backend.
//!
//! ```text
//!     OldLbOnly ──► DualRead ──► NewLbOnly
//!         ▲                          │
//!         └──────── rollback ────────┘
//! ```
//!
//! A global mode applies to every key unless the key has an override.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use tracing::info;

/// Which backend(s) a key is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DualReadMode {
    /// Only the old backend is read.
    #[default]
    OldLbOnly,
    /// Only the new backend is read.
    NewLbOnly,
    /// Both are read and compared; the old one stays authoritative.
    DualRead,
}

impl DualReadMode {
    /// True when reports from both sides should be compared.
    #[inline]
    pub fn is_dual(&self) -> bool {
        matches!(self, Self::DualRead)
    }

    /// True when the old backend is read.
    pub fn reads_old(&self) -> bool {
        !matches!(self, Self::NewLbOnly)
    }

    /// True when the new backend is read.
    pub fn reads_new(&self) -> bool {
        !matches!(self, Self::OldLbOnly)
    }
}

impl fmt::Display for DualReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OldLbOnly => write!(f, "OLD_LB_ONLY"),
            Self::NewLbOnly => write!(f, "NEW_LB_ONLY"),
            Self::DualRead => write!(f, "DUAL_READ"),
        }
    }
}

/// Global read mode plus per-key overrides.
///
/// ```rust
/// use pacer::{DualReadMode, ReadModes};
///
/// let modes = ReadModes::new(DualReadMode::DualRead);
/// modes.set_for_key("cluster-a", DualReadMode::OldLbOnly);
///
/// assert_eq!(modes.mode_for("cluster-a"), DualReadMode::OldLbOnly);
/// assert_eq!(modes.mode_for("cluster-b"), DualReadMode::DualRead);
/// ```
pub struct ReadModes {
    global: RwLock<DualReadMode>,
    overrides: DashMap<String, DualReadMode, ahash::RandomState>,
}

impl ReadModes {
    /// Creates a registry with `global` and no overrides.
    pub fn new(global: DualReadMode) -> Self {
        Self {
            global: RwLock::new(global),
            overrides: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Mode for keys without an override.
    pub fn global(&self) -> DualReadMode {
        *self.global.read()
    }

    /// Changes the mode for keys without an override.
    pub fn set_global(&self, mode: DualReadMode) {
        let previous = std::mem::replace(&mut *self.global.write(), mode);
        if previous != mode {
            info!("Global dual-read mode changed from {} to {}", previous, mode);
        }
    }

    /// Pins `key` to `mode` regardless of the global mode.
    pub fn set_for_key(&self, key: impl Into<String>, mode: DualReadMode) {
        self.overrides.insert(key.into(), mode);
    }

    /// Removes the override for `key`.
    pub fn clear_for_key(&self, key: &str) {
        self.overrides.remove(key);
    }

    /// Effective mode for `key`.
    pub fn mode_for(&self, key: &str) -> DualReadMode {
        match self.overrides.get(key) {
            Some(mode) => *mode,
            None => self.global(),
        }
    }

    /// Number of keys with an override.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Default for ReadModes {
    fn default() -> Self {
        Self::new(DualReadMode::default())
    }
}

impl fmt::Debug for ReadModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadModes")
            .field("global", &self.global())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}
