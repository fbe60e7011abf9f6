// src/resilience/tests/metrics_tests.rs

use std::sync::Arc;
use std::time::Duration;

use crate::resilience::{Clock, ManualClock, MetricsCollector, OperationKind};

fn collector() -> (MetricsCollector, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    (MetricsCollector::with_clock(clock.clone()), clock)
}

#[tokio::test]
async fn test_nothing_measured_yet() {
    let (metrics, _clock) = collector();
    let snapshot = metrics.snapshot().await;

    assert_eq!(snapshot.ping_latency_ms, None, "absent is not zero");
    assert_eq!(snapshot.last_successful_operation, None);
    assert_eq!(snapshot.total_operations, 0);
}

#[tokio::test]
async fn test_successful_ping_updates_latency_and_timestamp() {
    let (metrics, clock) = collector();

    metrics.record_operation(OperationKind::Ping, 0.4, true).await;

    let snapshot = metrics.snapshot().await;
    let latency = snapshot.ping_latency_ms.unwrap();
    assert!((latency - 0.4).abs() < 1e-9);
    assert_eq!(snapshot.last_successful_operation, Some(clock.now()));
}

#[tokio::test]
async fn test_publish_does_not_touch_ping_latency() {
    let (metrics, clock) = collector();

    metrics.record_operation(OperationKind::Ping, 1.5, true).await;
    clock.advance(Duration::from_secs(3));
    metrics.record_operation(OperationKind::Publish, 9.0, true).await;

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.ping_latency_ms, Some(1.5));
    assert_eq!(snapshot.last_successful_operation, Some(clock.now()));
}

#[tokio::test]
async fn test_failures_count_but_keep_last_success() {
    let (metrics, clock) = collector();

    metrics.record_operation(OperationKind::Ping, 2.0, true).await;
    let succeeded_at = clock.now();

    clock.advance(Duration::from_secs(10));
    metrics.record_operation(OperationKind::Ping, 1000.0, false).await;
    metrics.record_operation(OperationKind::Publish, 1000.0, false).await;

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.ping_latency_ms, Some(2.0));
    assert_eq!(snapshot.last_successful_operation, Some(succeeded_at));
    assert_eq!(snapshot.total_operations, 3);
    assert_eq!(snapshot.failed_operations, 2);
}

#[tokio::test]
async fn test_latency_is_never_negative() {
    let (metrics, _clock) = collector();

    metrics.record_operation(OperationKind::Ping, -3.0, true).await;
    assert_eq!(metrics.snapshot().await.ping_latency_ms, Some(0.0));

    metrics.record_operation(OperationKind::Ping, f64::NAN, true).await;
    assert_eq!(metrics.snapshot().await.ping_latency_ms, Some(0.0));
}

#[tokio::test]
async fn test_concurrent_recording() {
    let (metrics, _clock) = collector();
    let metrics = Arc::new(metrics);

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move {
                metrics
                    .record_operation(OperationKind::Publish, i as f64, i % 5 != 0)
                    .await;
                metrics.snapshot().await
            })
        })
        .collect();
    futures::future::join_all(handles).await;

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.total_operations, 50);
    assert_eq!(snapshot.failed_operations, 10);
}

#[tokio::test]
async fn test_health_check_refreshes_latency_outside_totals() {
    let (metrics, clock) = collector();

    metrics.record_operation(OperationKind::Publish, 2.0, true).await;
    clock.advance(Duration::from_secs(1));
    metrics.record_operation(OperationKind::HealthCheck, 0.7, true).await;

    let snapshot = metrics.snapshot().await;
    assert_eq!(snapshot.ping_latency_ms, Some(0.7));
    assert_eq!(snapshot.last_successful_operation, Some(clock.now()));
    assert_eq!(snapshot.total_operations, 1);
    assert_eq!(snapshot.failed_operations, 0);
}
