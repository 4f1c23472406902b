use std::net::IpAddr;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tokio::time::Instant;
use tollgate_lib::config::RateConfig;
use tollgate_lib::security::LimiterGroup;

fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid ip")
}

fn rate_config(rate_limit: f64, client_rate_limit: f64, cleanup_minutes: u64) -> RateConfig {
    RateConfig {
        rate_limit,
        client_rate_limit,
        cleanup_interval_minutes: cleanup_minutes,
        ..RateConfig::default()
    }
}

#[test]
fn test_route_bucket_exists_only_with_route_rate() {
    let with_route = LimiterGroup::new("/api", rate_config(5.0, 0.0, 0), None);
    assert!(with_route.route_bucket().is_some());
    assert_eq!(with_route.route_bucket().map(|b| b.capacity()), Some(5));

    let client_only = LimiterGroup::new("/api", rate_config(0.0, 1.0, 0), None);
    assert!(client_only.route_bucket().is_none());
}

#[test]
fn test_default_cleanup_interval() {
    let group = LimiterGroup::new("/api", rate_config(1.0, 1.0, 0), None);
    assert_eq!(group.cleanup_interval(), Duration::from_secs(600));

    let group = LimiterGroup::new("/api", rate_config(1.0, 1.0, 3), None);
    assert_eq!(group.cleanup_interval(), Duration::from_secs(180));
}

#[test]
fn test_client_entry_is_reused_and_touched() {
    let group = LimiterGroup::new("/api", rate_config(0.0, 1.0, 1), None);
    let t0 = Instant::now();

    let first = group.client_entry_at(ip("10.0.0.1"), t0);
    let second = group.client_entry_at(ip("10.0.0.1"), t0 + Duration::from_secs(5));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.request_count(), 2);
    assert_eq!(second.last_seen(), t0 + Duration::from_secs(5));
    assert_eq!(group.client_count(), 1);
}

#[test]
fn test_last_seen_never_moves_backwards() {
    let group = LimiterGroup::new("/api", rate_config(0.0, 1.0, 1), None);
    let t0 = Instant::now();

    group.client_entry_at(ip("10.0.0.1"), t0 + Duration::from_secs(10));
    let entry = group.client_entry_at(ip("10.0.0.1"), t0 + Duration::from_secs(2));

    assert_eq!(entry.last_seen(), t0 + Duration::from_secs(10));
}

#[test]
fn test_clients_have_independent_buckets() {
    let group = LimiterGroup::new(
        "/api",
        RateConfig { client_burst: Some(1), ..rate_config(0.0, 0.001, 1) },
        None,
    );

    assert!(group.client_entry(ip("10.0.0.1")).bucket().allow());
    assert!(!group.client_entry(ip("10.0.0.1")).bucket().allow());
    assert!(group.client_entry(ip("10.0.0.2")).bucket().allow());
    assert_eq!(group.client_count(), 2);
}

#[test]
fn test_concurrent_first_requests_share_one_entry() {
    const THREADS: usize = 16;
    let group = Arc::new(LimiterGroup::new(
        "/api",
        RateConfig { client_burst: Some(THREADS as u32), ..rate_config(0.0, 0.001, 1) },
        None,
    ));
    let barrier = Arc::new(Barrier::new(THREADS));
    let key = ip("192.0.2.10");

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let group = Arc::clone(&group);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let entry = group.client_entry(key);
                let admitted = entry.bucket().allow();
                (entry, admitted)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(group.client_count(), 1);
    let first = &results[0].0;
    for (entry, admitted) in &results {
        assert!(Arc::ptr_eq(first, entry));
        assert!(admitted);
    }
    assert_eq!(first.request_count(), THREADS as u64);
    // Every token was consumed exactly once
    assert!(first.bucket().available() < 1.0);
    assert!(!first.bucket().allow());
}

#[test]
fn test_sweep_evicts_idle_clients_only() {
    let group = LimiterGroup::new("/api", rate_config(0.0, 1.0, 1), None);
    let t0 = Instant::now();

    group.client_entry_at(ip("10.0.0.1"), t0);
    group.client_entry_at(ip("10.0.0.2"), t0 + Duration::from_secs(50));

    let removed = group.sweep(t0 + Duration::from_secs(60));

    assert_eq!(removed, 1);
    assert!(group.peek_client(ip("10.0.0.1")).is_none());
    assert!(group.peek_client(ip("10.0.0.2")).is_some());
}

#[test]
fn test_peek_does_not_touch() {
    let group = LimiterGroup::new("/api", rate_config(0.0, 1.0, 1), None);
    let t0 = Instant::now();
    group.client_entry_at(ip("10.0.0.1"), t0);

    let entry = group.peek_client(ip("10.0.0.1")).expect("entry exists");
    assert_eq!(entry.request_count(), 1);
    assert_eq!(entry.last_seen(), t0);
    assert!(group.peek_client(ip("10.0.0.9")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_evicts_after_interval() {
    let group = LimiterGroup::start("/api", rate_config(0.0, 1.0, 1), None);

    group.client_entry(ip("10.0.0.1"));
    tokio::time::sleep(Duration::from_secs(30)).await;
    group.client_entry(ip("10.0.0.2"));

    // First sweep at 60s: .1 idle for 60s, .2 idle for 30s
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(group.peek_client(ip("10.0.0.1")).is_none());
    assert!(group.peek_client(ip("10.0.0.2")).is_some());

    // Second sweep at 120s removes the remaining idle client
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(group.client_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_stops_when_group_dropped() {
    let group = Arc::new(LimiterGroup::new("/api", rate_config(0.0, 1.0, 1), None));
    let handle = group.spawn_sweeper();
    drop(group);

    let finished = tokio::time::timeout(Duration::from_secs(120), handle).await;
    assert!(matches!(finished, Ok(Ok(()))));
}
