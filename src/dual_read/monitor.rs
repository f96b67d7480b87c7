//! # Dual-Read Monitor
//!
//! While a service discovery migration runs, every property is read from
//! the old and the new backend and both results are reported here. The
//! monitor keeps the latest report of each side per key until the other
//! side catches up:
//!
//! ```text
//!     report(old, "svc", v7) ──► ┌──────────────────────────┐
//!                                │ "svc": old=v7  new=None  │ ◄── waiting
//!     report(new, "svc", v7) ──► └──────────────────────────┘
//!                                      │
//!                     same version, same data? ──Yes──► match, entry removed
//!                                      │
//!                                      No ── same version ──► mismatch, warn
//!                                      │
//!                                      └── otherwise keep latest per side
//!
//!     evict_expired() ──► entries older than the TTL are divergences
//! ```
//!
//! Entries live in a sharded `DashMap`, so reports for different keys never
//! contend. Versions starting with `-1` were read from the local filesystem
//! cache and match any version as long as the data is equal.

use super::{
    config::DualReadConfig,
    error::DualReadError,
    metrics::DualReadStats,
    mode::{DualReadMode, ReadModes},
    property::{MonitoredProperty, PropertyKind},
    similarity::UriSimilarity,
};
use crate::rate_limiter::{RateLimitedLog, SharedClock};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Version prefix of data read from the filesystem cache.
pub const VERSION_FROM_FS: &str = "-1";

fn is_read_from_fs(a: &str, b: &str) -> bool {
    a.starts_with(VERSION_FROM_FS) || b.starts_with(VERSION_FROM_FS)
}

fn side(from_new: bool) -> &'static str {
    if from_new {
        "new"
    } else {
        "old"
    }
}

#[derive(Debug, Clone)]
struct Reported<T> {
    data: T,
    version: String,
    reported_at_ms: u64,
}

#[derive(Debug)]
struct Entry<T> {
    old: Option<Reported<T>>,
    new: Option<Reported<T>>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self { old: None, new: None }
    }
}

impl<T> Entry<T> {
    fn is_empty(&self) -> bool {
        self.old.is_none() && self.new.is_none()
    }

    fn filled(&self) -> i64 {
        self.old.is_some() as i64 + self.new.is_some() as i64
    }

    fn oldest_report_ms(&self) -> u64 {
        [&self.old, &self.new]
            .iter()
            .filter_map(|slot| slot.as_ref().map(|r| r.reported_at_ms))
            .min()
            .unwrap_or(u64::MAX)
    }

    fn version(slot: &Option<Reported<T>>) -> &str {
        slot.as_ref().map_or("-", |r| r.version.as_str())
    }
}

#[derive(Debug, Default)]
struct Counters {
    matches: AtomicU64,
    mismatches: AtomicU64,
    ttl_evictions: AtomicU64,
    capacity_evictions: AtomicU64,
    skipped: AtomicU64,
    duplicates: AtomicU64,
    out_of_sync: AtomicI64,
}

/// Compares what the old and the new backend report for each key.
///
/// # Example
///
/// ```rust
/// use pacer::{ClusterProperties, DualReadConfig, DualReadMonitor, ManualClock};
/// use std::sync::Arc;
///
/// let clock = ManualClock::new(0);
/// let monitor: DualReadMonitor<ClusterProperties> =
///     DualReadMonitor::new(DualReadConfig::default(), Arc::new(clock.clone())).unwrap();
///
/// let props = ClusterProperties::default();
/// monitor.report_data("cluster-a", props.clone(), "7", false);
/// monitor.report_data("cluster-a", props, "7", true);
///
/// let stats = monitor.stats();
/// assert_eq!(stats.matches, 1);
/// assert_eq!(stats.tracked_entries, 0);
/// ```
pub struct DualReadMonitor<T: MonitoredProperty> {
    entries: DashMap<String, Entry<T>, ahash::RandomState>,
    similarity: UriSimilarity,
    modes: Arc<ReadModes>,
    clock: SharedClock,
    config: DualReadConfig,
    counters: Counters,
    divergence_log: RateLimitedLog,
}

impl<T: MonitoredProperty> DualReadMonitor<T> {
    /// Creates a monitor comparing every key (global mode `DualRead`).
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn new(config: DualReadConfig, clock: SharedClock) -> Result<Self, DualReadError> {
        Self::with_modes(config, clock, Arc::new(ReadModes::new(DualReadMode::DualRead)))
    }

    /// Creates a monitor that consults `modes` before comparing a key.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn with_modes(
        config: DualReadConfig,
        clock: SharedClock,
        modes: Arc<ReadModes>,
    ) -> Result<Self, DualReadError> {
        config.validate()?;

        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .next_power_of_two()
            .clamp(4, 64);
        let initial_capacity = (config.max_entries / num_shards).clamp(16, 1024);

        Ok(Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(
                initial_capacity,
                ahash::RandomState::new(),
                num_shards,
            ),
            similarity: UriSimilarity::new(),
            modes,
            divergence_log: RateLimitedLog::new(config.divergence_log_interval_ms),
            clock,
            config,
            counters: Counters::default(),
        })
    }

    /// Records what one backend returned for `key`.
    ///
    /// Never fails: the outcome shows up in logs and in [`stats`](Self::stats).
    pub fn report_data(&self, key: &str, value: T, version: impl Into<String>, from_new: bool) {
        let version = version.into();
        let now_ms = self.clock.now_ms();

        let mode = self.modes.mode_for(key);
        if !mode.is_dual() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            if self.forget(key) {
                debug!("Dropped {} for {}, now in {} mode", T::KIND, key, mode);
            }
            return;
        }

        if let Some(uris) = value.uris() {
            let (matched, total) = self.similarity.update(key, uris.clone(), from_new);
            if matched < total {
                self.log_divergence(
                    now_ms,
                    format_args!(
                        "{} of {} hosts differ between old and new LB for {}",
                        total - matched,
                        total,
                        key
                    ),
                );
            }
        }

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.make_room(now_ms);
        }

        let mut guard = self.entries.entry(key.to_string()).or_default();
        let Entry { old, new } = guard.value_mut();
        let (own, other) = if from_new { (new, old) } else { (old, new) };

        if let Some(existing) = own.as_ref() {
            if existing.data == value {
                if existing.version == version {
                    self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Duplicate {} for {} from {} LB, version {}",
                        T::KIND,
                        key,
                        side(from_new),
                        version
                    );
                    return;
                }
                if !is_read_from_fs(&existing.version, &version) {
                    debug!(
                        "Same {} for {} from {} LB under a new version: {} -> {}",
                        T::KIND,
                        key,
                        side(from_new),
                        existing.version,
                        version
                    );
                }
            }
        }

        let (version_equal, data_equal, fs_version) = match other.as_ref() {
            Some(counterpart) => (
                counterpart.version == version,
                counterpart.data == value,
                is_read_from_fs(&counterpart.version, &version),
            ),
            None => (false, false, false),
        };

        if data_equal && (version_equal || fs_version) {
            // An older report from this side is superseded by the match.
            let superseded = own.take().is_some() as i64;
            let matched = other.take();
            self.counters.matches.fetch_add(1, Ordering::Relaxed);
            self.counters
                .out_of_sync
                .fetch_sub(1 + superseded, Ordering::Relaxed);
            debug!(
                "Matched {} for {} (old {}, new {})",
                T::KIND,
                key,
                if from_new { Entry::version(&matched) } else { version.as_str() },
                if from_new { version.as_str() } else { Entry::version(&matched) }
            );
        } else if version_equal {
            let superseded = own.take().is_some() as i64;
            let previous = other.take();
            self.counters.mismatches.fetch_add(1, Ordering::Relaxed);
            self.counters
                .out_of_sync
                .fetch_sub(1 + superseded, Ordering::Relaxed);
            self.log_divergence(
                now_ms,
                format_args!(
                    "Mismatched {} for {} at version {}: {} LB has {:?}, {} LB has {:?}",
                    T::KIND,
                    key,
                    version,
                    side(!from_new),
                    previous.map(|r| r.data),
                    side(from_new),
                    value
                ),
            );
        } else {
            if data_equal {
                debug!(
                    "Same {} for {} on both sides under different versions",
                    T::KIND,
                    key
                );
            }
            if own.is_none() {
                self.counters.out_of_sync.fetch_add(1, Ordering::Relaxed);
            }
            *own = Some(Reported {
                data: value,
                version,
                reported_at_ms: now_ms,
            });
        }

        let empty = guard.is_empty();
        drop(guard);
        if empty {
            self.entries.remove_if(key, |_, entry| entry.is_empty());
        }
    }

    /// URI divergence fires on every host flap, so it goes to debug and is
    /// throttled. Cluster and service divergence always warns.
    fn log_divergence(&self, now_ms: u64, message: fmt::Arguments<'_>) {
        if T::KIND != PropertyKind::Uri {
            warn!("{}", message);
        } else if self.divergence_log.should_log(now_ms) {
            debug!("{}", message);
        }
    }

    /// Removes `key` without a divergence signal.
    fn forget(&self, key: &str) -> bool {
        if T::KIND == PropertyKind::Uri {
            self.similarity.remove_cluster(key);
        }
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.counters
                    .out_of_sync
                    .fetch_sub(entry.filled(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Evicts reports older than the TTL, logging each as a divergence.
    ///
    /// Returns the number of reports evicted.
    pub fn evict_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let ttl_ms = self.config.entry_ttl_ms;
        let mut evicted = 0usize;

        self.entries.retain(|key, entry| {
            for (from_new, slot) in [(false, &mut entry.old), (true, &mut entry.new)] {
                let expired = matches!(
                    slot,
                    Some(report) if now_ms.saturating_sub(report.reported_at_ms) >= ttl_ms
                );
                if expired {
                    if let Some(report) = slot.take() {
                        warn!(
                            "Evicting {} for {} reported by {} LB at version {}, no counterpart after {}ms",
                            T::KIND,
                            key,
                            side(from_new),
                            report.version,
                            now_ms.saturating_sub(report.reported_at_ms)
                        );
                        evicted += 1;
                    }
                }
            }
            !entry.is_empty()
        });

        if evicted > 0 {
            self.counters
                .ttl_evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            self.counters
                .out_of_sync
                .fetch_sub(evicted as i64, Ordering::Relaxed);
            info!("Evicted {} expired {} reports", evicted, T::KIND);
        }
        evicted
    }

    /// Sweeps, then drops the oldest entry if still at the limit.
    fn make_room(&self, now_ms: u64) {
        self.evict_expired();
        if self.entries.len() < self.config.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().oldest_report_ms())
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.counters.capacity_evictions.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .out_of_sync
                    .fetch_sub(entry.filled(), Ordering::Relaxed);
                debug!(
                    "Evicted {} for {} to stay under {} entries (old {}, new {}, age {}ms)",
                    T::KIND,
                    key,
                    self.config.max_entries,
                    Entry::version(&entry.old),
                    Entry::version(&entry.new),
                    now_ms.saturating_sub(entry.oldest_report_ms())
                );
            }
        }
    }

    /// Stops tracking `cluster` for the similarity gauge and drops its entry.
    pub fn remove_cluster(&self, cluster: &str) -> bool {
        self.forget(cluster)
    }

    /// Runs [`evict_expired`](Self::evict_expired) every `sweep_interval_ms`
    /// on a background thread until the returned sender fires or is dropped.
    ///
    /// # Errors
    ///
    /// [`DualReadError::SweeperStart`] if the thread cannot be spawned.
    pub fn start_sweeper(
        self: Arc<Self>,
    ) -> Result<(thread::JoinHandle<()>, mpsc::Sender<()>), DualReadError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let monitor = self;

        let handle = thread::Builder::new()
            .name(format!("pacer-dual-read-{}", T::KIND))
            .spawn(move || {
                info!(
                    "Started {} dual-read sweeper (interval: {}ms, ttl: {}ms)",
                    T::KIND,
                    monitor.config.sweep_interval_ms,
                    monitor.config.entry_ttl_ms
                );

                loop {
                    match stop_rx.recv_timeout(Duration::from_millis(monitor.config.sweep_interval_ms)) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("{} dual-read sweeper stopping", T::KIND);
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            monitor.evict_expired();
                        }
                    }
                }
            })
            .map_err(|err| DualReadError::SweeperStart(err.to_string()))?;

        Ok((handle, stop_tx))
    }

    /// Current URI similarity, 1.0 when nothing is tracked.
    pub fn similarity(&self) -> f64 {
        self.similarity.similarity()
    }

    /// The similarity tracker.
    pub fn uri_similarity(&self) -> &UriSimilarity {
        &self.similarity
    }

    /// Read modes consulted before each comparison.
    pub fn modes(&self) -> &Arc<ReadModes> {
        &self.modes
    }

    /// Keys waiting for a counterpart.
    pub fn tracked_entries(&self) -> usize {
        self.entries.len()
    }

    /// Version each side last reported for `key`, if it is still waiting.
    pub fn pending_versions(&self, key: &str) -> Option<(Option<String>, Option<String>)> {
        self.entries.get(key).map(|entry| {
            (
                entry.old.as_ref().map(|r| r.version.clone()),
                entry.new.as_ref().map(|r| r.version.clone()),
            )
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &DualReadConfig {
        &self.config
    }

    /// Snapshot of counters and gauges.
    pub fn stats(&self) -> DualReadStats {
        DualReadStats {
            kind: T::KIND,
            tracked_entries: self.entries.len(),
            matches: self.counters.matches.load(Ordering::Relaxed),
            mismatches: self.counters.mismatches.load(Ordering::Relaxed),
            ttl_evictions: self.counters.ttl_evictions.load(Ordering::Relaxed),
            capacity_evictions: self.counters.capacity_evictions.load(Ordering::Relaxed),
            skipped_reports: self.counters.skipped.load(Ordering::Relaxed),
            duplicate_reports: self.counters.duplicates.load(Ordering::Relaxed),
            out_of_sync: self.counters.out_of_sync.load(Ordering::Relaxed),
            similarity: self.similarity.similarity(),
        }
    }
}

impl<T: MonitoredProperty> fmt::Debug for DualReadMonitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualReadMonitor")
            .field("kind", &T::KIND)
            .field("tracked_entries", &self.entries.len())
            .field("entry_ttl_ms", &self.config.entry_ttl_ms)
            .field("max_entries", &self.config.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dual_read::property::{ClusterProperties, ServiceProperties, UriData, UriProperties};
    use crate::rate_limiter::ManualClock;

    fn cluster(scheme: &str) -> ClusterProperties {
        ClusterProperties {
            cluster_name: "c".to_string(),
            prioritized_schemes: vec![scheme.to_string()],
            ..Default::default()
        }
    }

    fn monitor<T: MonitoredProperty>(clock: &ManualClock, config: DualReadConfig) -> DualReadMonitor<T> {
        DualReadMonitor::new(config, Arc::new(clock.clone())).unwrap()
    }

    /// Level and message of every event emitted on this thread while `f` runs.
    fn capture_events(f: impl FnOnce()) -> Vec<(tracing::Level, String)> {
        use tracing::field::{Field, Visit};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        struct Message(String);

        impl Visit for Message {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{:?}", value);
                }
            }
        }

        struct Capture(Arc<parking_lot::Mutex<Vec<(tracing::Level, String)>>>);

        impl<S: tracing::Subscriber> Layer<S> for Capture {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                let mut message = Message(String::new());
                event.record(&mut message);
                self.0.lock().push((*event.metadata().level(), message.0));
            }
        }

        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Capture(events.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let captured = events.lock().clone();
        captured
    }

    fn divergence_levels(events: &[(tracing::Level, String)]) -> Vec<tracing::Level> {
        events
            .iter()
            .filter(|(_, message)| message.contains("hosts differ") || message.contains("Mismatched"))
            .map(|(level, _)| *level)
            .collect()
    }

    #[test]
    fn test_same_version_from_both_sides_matches() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        assert_eq!(monitor.tracked_entries(), 1);
        assert_eq!(monitor.stats().out_of_sync, 1);

        monitor.report_data("c", cluster("http"), "1", true);
        let stats = monitor.stats();
        assert_eq!(stats.matches, 1);
        assert_eq!(stats.mismatches, 0);
        assert_eq!(stats.tracked_entries, 0);
        assert_eq!(stats.out_of_sync, 0);
        assert!(stats.is_in_sync());
    }

    #[test]
    fn test_same_version_different_data_is_mismatch() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", true);
        monitor.report_data("c", cluster("https"), "1", false);

        let stats = monitor.stats();
        assert_eq!(stats.matches, 0);
        assert_eq!(stats.mismatches, 1);
        assert_eq!(stats.tracked_entries, 0);
        assert_eq!(stats.out_of_sync, 0);
    }

    #[test]
    fn test_different_versions_wait_for_counterpart() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        monitor.report_data("c", cluster("http"), "2", true);
        assert_eq!(
            monitor.pending_versions("c"),
            Some((Some("1".to_string()), Some("2".to_string())))
        );

        // The old side catches up; its stale version 1 goes with the match.
        monitor.report_data("c", cluster("http"), "2", false);
        let stats = monitor.stats();
        assert_eq!(stats.matches, 1);
        assert_eq!(monitor.pending_versions("c"), None);
        assert_eq!(stats.out_of_sync, 0);
    }

    #[test]
    fn test_latest_report_wins() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        monitor.report_data("c", cluster("https"), "2", false);
        assert_eq!(monitor.pending_versions("c"), Some((Some("2".to_string()), None)));
        assert_eq!(monitor.stats().out_of_sync, 1);
    }

    #[test]
    fn test_duplicate_report_ignored() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        monitor.report_data("c", cluster("http"), "1", false);

        let stats = monitor.stats();
        assert_eq!(stats.duplicate_reports, 1);
        assert_eq!(stats.out_of_sync, 1);
        assert_eq!(stats.tracked_entries, 1);
    }

    #[test]
    fn test_filesystem_version_matches_any_version() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "-1|3", false);
        monitor.report_data("c", cluster("http"), "42", true);
        assert_eq!(monitor.stats().matches, 1);
        assert_eq!(monitor.tracked_entries(), 0);

        monitor.report_data("d", cluster("http"), "-1|3", false);
        monitor.report_data("d", cluster("https"), "42", true);
        assert_eq!(monitor.stats().mismatches, 0, "different data is not a match");
        assert_eq!(monitor.tracked_entries(), 1);
    }

    #[test]
    fn test_unmatched_entry_evicted_after_ttl() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ServiceProperties>(&clock, DualReadConfig::default());

        monitor.report_data("svc", ServiceProperties::default(), "1", false);
        clock.advance(29_999);
        assert_eq!(monitor.evict_expired(), 0);

        clock.advance(1);
        assert_eq!(monitor.evict_expired(), 1);

        let stats = monitor.stats();
        assert_eq!(stats.ttl_evictions, 1);
        assert_eq!(stats.matches, 0, "eviction is not a match");
        assert_eq!(stats.tracked_entries, 0);
        assert_eq!(stats.out_of_sync, 0);
        assert_eq!(stats.kind, PropertyKind::Service);
    }

    #[test]
    fn test_eviction_is_per_side() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        clock.advance(20_000);
        monitor.report_data("c", cluster("http"), "2", true);
        clock.advance(10_000);

        assert_eq!(monitor.evict_expired(), 1);
        assert_eq!(monitor.pending_versions("c"), Some((None, Some("2".to_string()))));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(
            &clock,
            DualReadConfig::default().with_max_entries(2),
        );

        monitor.report_data("a", cluster("http"), "1", false);
        clock.advance(10);
        monitor.report_data("b", cluster("http"), "1", false);
        clock.advance(10);
        monitor.report_data("c", cluster("http"), "1", false);

        let stats = monitor.stats();
        assert_eq!(stats.capacity_evictions, 1);
        assert_eq!(stats.tracked_entries, 2);
        assert_eq!(stats.out_of_sync, 2);
        assert!(monitor.pending_versions("a").is_none());
        assert!(monitor.pending_versions("c").is_some());
    }

    #[test]
    fn test_capacity_prefers_expired_entries() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(
            &clock,
            DualReadConfig::default().with_max_entries(1).with_entry_ttl_ms(100),
        );

        monitor.report_data("a", cluster("http"), "1", false);
        clock.advance(100);
        monitor.report_data("b", cluster("http"), "1", false);

        let stats = monitor.stats();
        assert_eq!(stats.ttl_evictions, 1);
        assert_eq!(stats.capacity_evictions, 0);
    }

    #[test]
    fn test_non_dual_mode_skips_and_drops() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(&clock, DualReadConfig::default());

        monitor.report_data("c", cluster("http"), "1", false);
        monitor.modes().set_for_key("c", DualReadMode::NewLbOnly);
        monitor.report_data("c", cluster("https"), "1", true);

        let stats = monitor.stats();
        assert_eq!(stats.skipped_reports, 1);
        assert_eq!(stats.mismatches, 0);
        assert_eq!(stats.tracked_entries, 0);
        assert_eq!(stats.out_of_sync, 0);

        monitor.modes().clear_for_key("c");
        monitor.report_data("c", cluster("http"), "1", false);
        assert_eq!(monitor.tracked_entries(), 1);
    }

    #[test]
    fn test_uri_similarity_tracks_intersection_over_union() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<UriProperties>(&clock, DualReadConfig::default());
        let uris = |names: &[&str]| {
            UriProperties::new(
                "c",
                names
                    .iter()
                    .map(|name| (name.to_string(), UriData::with_weights([(0, 1.0)]))),
            )
        };

        monitor.report_data("c", uris(&["h1", "h2", "h3"]), "5", false);
        assert_eq!(monitor.similarity(), 1.0, "one side alone does not count");

        monitor.report_data("c", uris(&["h2", "h3", "h4", "h5"]), "6", true);
        assert_eq!(monitor.similarity(), 2.0 / 5.0);
        assert_eq!(monitor.uri_similarity().cluster_counts("c"), Some((2, 5)));

        monitor.report_data("c", uris(&["h2", "h3", "h4", "h5"]), "6", false);
        assert_eq!(monitor.similarity(), 1.0);
        assert_eq!(monitor.stats().matches, 1);

        assert_eq!(monitor.tracked_entries(), 0);
        assert_eq!(monitor.stats().out_of_sync, 0);

        monitor.report_data("c", uris(&["h1"]), "7", true);
        assert!(monitor.remove_cluster("c"));
        assert_eq!(monitor.uri_similarity().tracked_clusters(), 0);
        assert_eq!(monitor.similarity(), 1.0);
    }

    #[test]
    fn test_uri_divergence_logs_at_debug_and_is_throttled() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<UriProperties>(
            &clock,
            DualReadConfig::default().with_divergence_log_interval_ms(1000),
        );
        let uris = |name: &str| {
            UriProperties::new("c", [(name.to_string(), UriData::with_weights([(0, 1.0)]))])
        };

        let events = capture_events(|| {
            monitor.report_data("c", uris("h1"), "1", false);
            monitor.report_data("c", uris("h2"), "1", true);

            clock.advance(1000);
            monitor.report_data("c", uris("h1"), "2", false);
            monitor.report_data("c", uris("h2"), "2", true);
        });

        assert_eq!(monitor.stats().mismatches, 2);
        // One line per interval, the rest are dropped.
        assert_eq!(
            divergence_levels(&events),
            vec![tracing::Level::DEBUG, tracing::Level::DEBUG]
        );
    }

    #[test]
    fn test_cluster_divergence_always_warns() {
        let clock = ManualClock::new(0);
        let monitor = monitor::<ClusterProperties>(
            &clock,
            DualReadConfig::default().with_divergence_log_interval_ms(1000),
        );

        let events = capture_events(|| {
            for version in ["1", "2", "3"] {
                monitor.report_data("c", cluster("http"), version, false);
                monitor.report_data("c", cluster("https"), version, true);
            }
        });

        assert_eq!(monitor.stats().mismatches, 3);
        assert_eq!(divergence_levels(&events), vec![tracing::Level::WARN; 3]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let clock = ManualClock::new(0);
        let result = DualReadMonitor::<ClusterProperties>::new(
            DualReadConfig::default().with_entry_ttl_ms(0),
            Arc::new(clock),
        );
        assert!(matches!(result, Err(DualReadError::InvalidConfig(_))));
    }

    #[test]
    fn test_concurrent_reports() {
        let clock = ManualClock::new(0);
        let monitor = Arc::new(monitor::<ClusterProperties>(&clock, DualReadConfig::default()));

        let handles: Vec<_> = [false, true]
            .into_iter()
            .map(|from_new| {
                let monitor = monitor.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        monitor.report_data(&format!("key-{}", i), cluster("http"), "1", from_new);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = monitor.stats();
        assert_eq!(stats.matches, 500);
        assert_eq!(stats.tracked_entries, 0);
        assert_eq!(stats.out_of_sync, 0);
    }

    #[test]
    fn test_sweeper_thread_stops() {
        let clock = ManualClock::new(0);
        let monitor = Arc::new(monitor::<ClusterProperties>(
            &clock,
            DualReadConfig::default()
                .with_entry_ttl_ms(10)
                .with_sweep_interval_ms(10),
        ));

        monitor.report_data("c", cluster("http"), "1", false);
        clock.advance(10);

        let (handle, stop_tx) = monitor.clone().start_sweeper().unwrap();
        thread::sleep(Duration::from_millis(100));
        stop_tx.send(()).unwrap();
        handle.join().unwrap();

        assert_eq!(monitor.tracked_entries(), 0);
        assert_eq!(monitor.stats().ttl_evictions, 1);
    }
}
