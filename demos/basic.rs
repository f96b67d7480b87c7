//! Basic usage example for the pacer crate.
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see the limiter's
//! own logging.

use pacer::{OverflowPolicy, RateLimiterBuilder, UNLIMITED_BURST};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Basic Rate Limiter Example ===\n");

    // Example 1: Pacing callbacks
    pacing_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Changing the rate while callbacks wait
    set_rate_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Buffer limits and TTL
    overflow_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: Ramping up
    ramp_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 5: Monitoring metrics
    metrics_example();
}

fn pacing_example() {
    println!("1. Pacing Callbacks:");

    // 5 per second, one at a time
    let limiter = RateLimiterBuilder::new()
        .name("pacing")
        .rate(5.0, 1000, 1)
        .build()
        .unwrap();

    println!(
        "   Created limiter with {} permit every {}ms",
        limiter.rate().events(),
        limiter.rate().period_ms()
    );

    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    for i in 1..=5 {
        let tx = tx.clone();
        limiter
            .submit(Box::new(move |result| {
                let _ = tx.send((i, result.is_ok(), start.elapsed()));
            }))
            .unwrap();
    }

    for _ in 0..5 {
        let (i, ok, elapsed) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let mark = if ok { "✅" } else { "❌" };
        println!("   Request {} - {} at {:>4}ms", i, mark, elapsed.as_millis());
    }
}

fn set_rate_example() {
    println!("2. Live Rate Changes:");

    let limiter = RateLimiterBuilder::new()
        .name("set-rate")
        .rate(2.0, 1000, UNLIMITED_BURST)
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    for i in 1..=10 {
        let tx = tx.clone();
        limiter
            .submit(Box::new(move |_| {
                let _ = tx.send((i, start.elapsed()));
            }))
            .unwrap();
    }
    println!("   10 submitted at 2/s, {} waiting", limiter.pending());

    thread::sleep(Duration::from_millis(600));
    limiter.set_rate(20.0, 1000, UNLIMITED_BURST).unwrap();
    println!("   Rate raised to 20/s after 600ms");

    for _ in 0..10 {
        let (i, elapsed) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        println!("   Request {:>2} granted at {:>4}ms", i, elapsed.as_millis());
    }
}

fn overflow_example() {
    println!("3. Buffer Limits and TTL:");

    let limiter = RateLimiterBuilder::new()
        .name("overflow")
        .max_buffered(3)
        .overflow_policy(OverflowPolicy::DropOldest)
        .buffer_ttl_ms(300)
        .rate(1.0, 1000, UNLIMITED_BURST)
        .build()
        .unwrap();

    let (tx, rx) = mpsc::channel();
    for i in 1..=6 {
        let tx = tx.clone();
        limiter
            .submit(Box::new(move |result| {
                let _ = tx.send((i, result));
            }))
            .unwrap();
    }

    for _ in 0..6 {
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            (i, Ok(())) => println!("   Request {} - ✅ granted", i),
            (i, Err(err)) => println!("   Request {} - ⛔ {}", i, err),
        }
    }
}

fn ramp_example() {
    println!("4. Ramping Up:");

    let limiter = RateLimiterBuilder::new()
        .name("ramp")
        .build_ramp_up()
        .unwrap();

    // Reach 40 per 100ms in steps of 10
    limiter.ramp_to(40.0, 100, UNLIMITED_BURST, 10.0).unwrap();
    for _ in 0..5 {
        println!(
            "   rate {:>2}/{}ms, ramping: {}",
            limiter.rate().events(),
            limiter.rate().period_ms(),
            limiter.is_ramping()
        );
        thread::sleep(Duration::from_millis(100));
    }
}

fn metrics_example() {
    println!("5. Metrics:");

    let limiter = RateLimiterBuilder::new()
        .name("metrics")
        .max_buffered(20)
        .rate(10.0, 1000, UNLIMITED_BURST)
        .build()
        .unwrap();

    let mut rejected = 0;
    for _ in 0..40 {
        if limiter.submit(Box::new(|_| {})).is_err() {
            rejected += 1;
        }
    }
    println!("   {} submissions refused synchronously\n", rejected);

    let metrics = limiter.metrics();
    println!("{}", metrics.summary());
    println!("\n   Health: {:?}", metrics.health_status());
    println!("   Suggested action: {}", metrics.health_status().suggested_action());
}
