//! Simulated migration between two service discovery backends.
//!
//! Both backends publish service and host data; the monitors report what
//! agrees, what doesn't, and what never showed up on the other side.

use pacer::{
    DualReadConfig, DualReadMode, ManualClock, ReadModes, ServiceProperties,
    ServicePropertiesMonitor, UriData, UriProperties, UriPropertiesMonitor,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Dual Read Example ===\n");

    services_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    uris_example();
}

fn services_example() {
    println!("1. Service Properties:");

    let clock = ManualClock::new(0);
    let modes = Arc::new(ReadModes::new(DualReadMode::DualRead));
    modes.set_for_key("legacy", DualReadMode::OldLbOnly);

    let monitor = ServicePropertiesMonitor::with_modes(
        DualReadConfig::default().with_entry_ttl_ms(10_000),
        Arc::new(clock.clone()),
        modes,
    )
    .unwrap();

    let service = |cluster: &str| ServiceProperties {
        service_name: "search".to_string(),
        cluster_name: cluster.to_string(),
        path: "/search".to_string(),
        load_balancer_strategies: vec!["relative".to_string()],
    };

    // Same data, same version
    monitor.report_data("search", service("search-prod"), "7", false);
    monitor.report_data("search", service("search-prod"), "7", true);

    // Same version, different data
    monitor.report_data("search", service("search-prod"), "8", false);
    monitor.report_data("search", service("search-canary"), "8", true);

    // The new backend read from its file system cache
    monitor.report_data("search", service("search-prod"), "9", false);
    monitor.report_data("search", service("search-prod"), "-1|9", true);

    // Only one backend ever answers
    monitor.report_data("profile", ServiceProperties::default(), "3", false);

    // Not migrating
    monitor.report_data("legacy", ServiceProperties::default(), "1", true);

    clock.advance(10_000);
    let evicted = monitor.evict_expired();
    println!("   Evicted {} stale reports\n", evicted);

    println!("{}", monitor.stats());
}

fn uris_example() {
    println!("2. URI Properties with a Background Sweeper:");

    let monitor = Arc::new(
        UriPropertiesMonitor::new(
            DualReadConfig::default()
                .with_entry_ttl_ms(200)
                .with_sweep_interval_ms(50),
            Arc::new(pacer::SystemClock),
        )
        .unwrap(),
    );
    let (handle, stop) = monitor.clone().start_sweeper().unwrap();

    let hosts = |names: &[&str]| {
        UriProperties::new(
            "search-prod",
            names
                .iter()
                .map(|name| (name.to_string(), UriData::with_weights([(0, 1.0)]))),
        )
    };

    monitor.report_data("search-prod", hosts(&["h1", "h2", "h3", "h4"]), "11", false);
    monitor.report_data("search-prod", hosts(&["h2", "h3", "h4", "h5"]), "12", true);
    println!("   Similarity while hosts disagree: {:.2}", monitor.similarity());

    thread::sleep(Duration::from_millis(400));
    println!(
        "   Tracked after the sweeper ran: {}",
        monitor.tracked_entries()
    );

    monitor.report_data("search-prod", hosts(&["h2", "h3", "h4", "h5"]), "12", false);
    monitor.report_data("search-prod", hosts(&["h2", "h3", "h4", "h5"]), "12", true);
    println!("   Similarity once both agree: {:.2}\n", monitor.similarity());

    stop.send(()).unwrap();
    handle.join().unwrap();

    println!("{}", monitor.stats());
}
