//! Service discovery properties compared by the dual-read monitor.
//!
//! ```text
//!     ClusterProperties   one per cluster     (rarely changes)
//!     ServiceProperties   one per service     (rarely changes)
//!     UriProperties       one per cluster     (changes with every host up/down)
//!         └── uri ──► UriData { partition weights, specific properties }
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// The kind of property a monitor compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// Cluster-level settings.
    Cluster,
    /// Service-level settings.
    Service,
    /// Host lists of a cluster.
    Uri,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => write!(f, "ClusterProperties"),
            Self::Service => write!(f, "ServiceProperties"),
            Self::Uri => write!(f, "UriProperties"),
        }
    }
}

/// A value that can be reported to a [`DualReadMonitor`](super::DualReadMonitor).
pub trait MonitoredProperty: PartialEq + fmt::Debug + Clone + Send + Sync + 'static {
    /// Kind used in logs and counters.
    const KIND: PropertyKind;

    /// Host map for URI properties; feeds the similarity gauge.
    fn uris(&self) -> Option<&BTreeMap<String, UriData>> {
        None
    }
}

/// Cluster-level settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterProperties {
    /// Cluster name.
    pub cluster_name: String,
    /// Schemes in order of preference.
    pub prioritized_schemes: Vec<String>,
    /// Free-form settings.
    pub properties: BTreeMap<String, String>,
}

impl MonitoredProperty for ClusterProperties {
    const KIND: PropertyKind = PropertyKind::Cluster;
}

/// Service-level settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceProperties {
    /// Service name.
    pub service_name: String,
    /// Cluster serving it.
    pub cluster_name: String,
    /// Request path.
    pub path: String,
    /// Load balancer strategies in order of preference.
    pub load_balancer_strategies: Vec<String>,
}

impl MonitoredProperty for ServiceProperties {
    const KIND: PropertyKind = PropertyKind::Service;
}

/// Per-host data inside [`UriProperties`].
///
/// A missing map and an empty map compare equal: the two backends encode
/// "nothing set" differently.
#[derive(Debug, Clone, Default)]
pub struct UriData {
    /// Weight per partition id.
    pub partition_weights: Option<BTreeMap<u32, f64>>,
    /// Host-specific settings.
    pub specific_properties: Option<BTreeMap<String, String>>,
}

impl UriData {
    /// Data with partition weights only.
    pub fn with_weights(weights: impl IntoIterator<Item = (u32, f64)>) -> Self {
        Self {
            partition_weights: Some(weights.into_iter().collect()),
            specific_properties: None,
        }
    }
}

fn same_map<K: Ord, V: PartialEq>(a: &Option<BTreeMap<K, V>>, b: &Option<BTreeMap<K, V>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (Some(map), None) | (None, Some(map)) => map.is_empty(),
        (None, None) => true,
    }
}

impl PartialEq for UriData {
    fn eq(&self, other: &Self) -> bool {
        same_map(&self.partition_weights, &other.partition_weights)
            && same_map(&self.specific_properties, &other.specific_properties)
    }
}

/// Hosts of one cluster.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UriProperties {
    /// Cluster name.
    pub cluster_name: String,
    /// Data per host URI.
    pub uris: BTreeMap<String, UriData>,
}

impl UriProperties {
    /// Creates properties for `cluster_name` from `(uri, data)` pairs.
    pub fn new(
        cluster_name: impl Into<String>,
        uris: impl IntoIterator<Item = (String, UriData)>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            uris: uris.into_iter().collect(),
        }
    }
}

impl MonitoredProperty for UriProperties {
    const KIND: PropertyKind = PropertyKind::Uri;

    fn uris(&self) -> Option<&BTreeMap<String, UriData>> {
        Some(&self.uris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_empty_maps_are_equal() {
        let absent = UriData::default();
        let empty = UriData {
            partition_weights: Some(BTreeMap::new()),
            specific_properties: Some(BTreeMap::new()),
        };
        assert_eq!(absent, empty);
        assert_eq!(empty, absent);
    }

    #[test]
    fn test_different_weights_differ() {
        let a = UriData::with_weights([(0, 1.0)]);
        let b = UriData::with_weights([(0, 0.5)]);
        assert_ne!(a, b);
        assert_ne!(a, UriData::default());
    }

    #[test]
    fn test_uri_properties_equality_uses_uri_data() {
        let a = UriProperties::new("c", [("h1".to_string(), UriData::default())]);
        let b = UriProperties::new(
            "c",
            [(
                "h1".to_string(),
                UriData {
                    partition_weights: None,
                    specific_properties: Some(BTreeMap::new()),
                },
            )],
        );
        assert_eq!(a, b);
        assert_eq!(UriProperties::KIND, PropertyKind::Uri);
        assert!(a.uris().is_some());
        assert!(ClusterProperties::default().uris().is_none());
    }
}
