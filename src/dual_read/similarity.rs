//! # URI Similarity
//!
//! Tracks how closely the host lists reported by the two backends agree,
//! as one ratio across every tracked cluster:
//!
//! ```text
//!     cluster-a   old {h1, h2, h3}   new {h2, h3, h4}   matched 2 / total 4
//!     cluster-b   old {h5}           new {h5}           matched 1 / total 1
//!                                                       ─────────────────────
//!                                        similarity =   3 / 5 = 0.6
//! ```
//!
//! A host matches when both sides list it with equal [`UriData`]. A cluster
//! only contributes once both sides have reported it. Each update removes
//! the cluster's previous contribution from the totals before adding the
//! new one, so the totals never need a full recount.

use super::property::UriData;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct ClusterUris {
    old: Option<BTreeMap<String, UriData>>,
    new: Option<BTreeMap<String, UriData>>,
    matched: u64,
    total: u64,
}

impl ClusterUris {
    fn recount(&mut self) {
        let (old, new) = match (&self.old, &self.new) {
            (Some(old), Some(new)) => (old, new),
            _ => {
                self.matched = 0;
                self.total = 0;
                return;
            }
        };

        let matched = old
            .iter()
            .filter(|(uri, data)| new.get(*uri).map_or(false, |other| other == *data))
            .count() as u64;
        let only_new = new.keys().filter(|uri| !old.contains_key(*uri)).count() as u64;

        self.matched = matched;
        self.total = old.len() as u64 + only_new;
    }
}

/// Running matched/total host counts across clusters.
pub struct UriSimilarity {
    clusters: DashMap<String, ClusterUris, ahash::RandomState>,
    matched: AtomicU64,
    total: AtomicU64,
}

impl UriSimilarity {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            clusters: DashMap::with_hasher(ahash::RandomState::new()),
            matched: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Records the hosts one side reported for `cluster`.
    ///
    /// Returns the cluster's `(matched, total)` after the update.
    pub fn update(&self, cluster: &str, uris: BTreeMap<String, UriData>, from_new: bool) -> (u64, u64) {
        let mut entry = self.clusters.entry(cluster.to_string()).or_default();
        let record = entry.value_mut();

        self.matched.fetch_sub(record.matched, Ordering::AcqRel);
        self.total.fetch_sub(record.total, Ordering::AcqRel);

        if from_new {
            record.new = Some(uris);
        } else {
            record.old = Some(uris);
        }
        record.recount();

        self.matched.fetch_add(record.matched, Ordering::AcqRel);
        self.total.fetch_add(record.total, Ordering::AcqRel);
        (record.matched, record.total)
    }

    /// Stops tracking `cluster`, removing its contribution.
    pub fn remove_cluster(&self, cluster: &str) -> bool {
        match self.clusters.remove(cluster) {
            Some((_, record)) => {
                self.matched.fetch_sub(record.matched, Ordering::AcqRel);
                self.total.fetch_sub(record.total, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    /// `(matched, total)` for one cluster.
    pub fn cluster_counts(&self, cluster: &str) -> Option<(u64, u64)> {
        self.clusters
            .get(cluster)
            .map(|record| (record.matched, record.total))
    }

    /// Matched hosts across all clusters.
    pub fn matched_uris(&self) -> u64 {
        self.matched.load(Ordering::Acquire)
    }

    /// Distinct hosts across all clusters.
    pub fn total_uris(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// `matched / total`, or 1.0 when nothing is tracked.
    pub fn similarity(&self) -> f64 {
        let total = self.total_uris();
        if total == 0 {
            return 1.0;
        }
        (self.matched_uris() as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Clusters being tracked.
    pub fn tracked_clusters(&self) -> usize {
        self.clusters.len()
    }
}

impl Default for UriSimilarity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UriSimilarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriSimilarity")
            .field("clusters", &self.clusters.len())
            .field("matched", &self.matched_uris())
            .field("total", &self.total_uris())
            .finish()
    }
}
