//! Monitor statistics.

use super::property::PropertyKind;
use std::fmt;

/// Snapshot of a [`DualReadMonitor`](super::DualReadMonitor).
#[derive(Debug, Clone, PartialEq)]
pub struct DualReadStats {
    /// Property kind the monitor compares.
    pub kind: PropertyKind,

    /// Keys currently waiting for a counterpart.
    pub tracked_entries: usize,

    /// Reports that matched the other side.
    pub matches: u64,

    /// Reports with the other side's version but different data.
    pub mismatches: u64,

    /// Unmatched reports evicted by age.
    pub ttl_evictions: u64,

    /// Entries pushed out to stay under `max_entries`.
    pub capacity_evictions: u64,

    /// Reports ignored because the key is not in dual-read mode.
    pub skipped_reports: u64,

    /// Reports identical to what the same side already held.
    pub duplicate_reports: u64,

    /// Filled slots without a counterpart.
    pub out_of_sync: i64,

    /// URI similarity in `[0, 1]`; 1.0 for non-URI monitors.
    pub similarity: f64,
}

impl DualReadStats {
    /// Divergence signals of any kind.
    pub fn total_divergences(&self) -> u64 {
        self.mismatches + self.ttl_evictions + self.capacity_evictions
    }

    /// Matches over matches plus divergences (1.0 with no traffic).
    pub fn match_ratio(&self) -> f64 {
        let total = self.matches + self.total_divergences();
        if total == 0 {
            1.0
        } else {
            self.matches as f64 / total as f64
        }
    }

    /// No divergence recorded and nothing waiting.
    pub fn is_in_sync(&self) -> bool {
        self.total_divergences() == 0 && self.out_of_sync == 0
    }

    /// Human-readable report.
    ///
    /// ```text
    /// Dual Read Stats (UriProperties):
    /// ├─ Tracked Entries: 3 (out of sync: 3)
    /// ├─ Matches: 120 (ratio 97.56%)
    /// ├─ Divergences:
    /// │  ├─ Mismatches: 1
    /// │  ├─ TTL Evictions: 2
    /// │  └─ Capacity Evictions: 0
    /// ├─ Skipped: 0, Duplicates: 4
    /// └─ Similarity: 0.9800
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Dual Read Stats ({}):\n\
             ├─ Tracked Entries: {} (out of sync: {})\n\
             ├─ Matches: {} (ratio {:.2}%)\n\
             ├─ Divergences:\n\
             │  ├─ Mismatches: {}\n\
             │  ├─ TTL Evictions: {}\n\
             │  └─ Capacity Evictions: {}\n\
             ├─ Skipped: {}, Duplicates: {}\n\
             └─ Similarity: {:.4}",
            self.kind,
            self.tracked_entries,
            self.out_of_sync,
            self.matches,
            self.match_ratio() * 100.0,
            self.mismatches,
            self.ttl_evictions,
            self.capacity_evictions,
            self.skipped_reports,
            self.duplicate_reports,
            self.similarity
        )
    }
}

impl fmt::Display for DualReadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
