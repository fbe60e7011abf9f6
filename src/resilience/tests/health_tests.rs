// src/resilience/tests/health_tests.rs

use serde_json::json;
use std::time::Duration;

use crate::error::{BrokerError, PubSubError};
use crate::resilience::{
    CircuitState, Clock, ConnectionStatus, HealthAggregator, HealthStatus,
};
use crate::test_utils::{mock_client, test_config};

#[test]
fn test_status_derivation_order() {
    use CircuitState::*;

    assert_eq!(HealthAggregator::derive_status(true, Closed, 0), HealthStatus::Healthy);
    assert_eq!(HealthAggregator::derive_status(true, Closed, 2), HealthStatus::Degraded);
    assert_eq!(HealthAggregator::derive_status(true, HalfOpen, 0), HealthStatus::Degraded);
    // open is offline, not degraded
    assert_eq!(HealthAggregator::derive_status(true, Open, 3), HealthStatus::Offline);
    assert_eq!(HealthAggregator::derive_status(false, Closed, 0), HealthStatus::Offline);
    assert_eq!(HealthAggregator::derive_status(false, HalfOpen, 1), HealthStatus::Offline);
}

#[tokio::test]
async fn test_healthy_report() {
    let (client, _broker, clock) = mock_client(test_config(3, Duration::from_secs(1), 2));

    let report = HealthAggregator::new(&client).snapshot().await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.timestamp, clock.now());
    assert_eq!(report.connection_pool.status, ConnectionStatus::Connected);
    assert_eq!(report.connection_pool.max_connections, 10);
    assert_eq!(report.connection_pool.active_connections, 2);
    assert_eq!(report.connection_pool.idle_connections, 8);
    assert_eq!(report.redis_info["redis_version"], "7.2.4");
    assert!(report.performance_metrics.ping_latency_ms.unwrap() >= 0.0);
    assert_eq!(
        report.performance_metrics.last_successful_operation,
        Some(clock.now())
    );

    let breaker = report.circuit_breaker.unwrap();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.failure_count, 0);
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_disconnected_broker_is_offline() {
    let (client, broker, _clock) = mock_client(test_config(3, Duration::from_secs(1), 2));
    broker.set_failure(true);

    let report = client.health().await;

    assert_eq!(report.status, HealthStatus::Offline);
    assert_eq!(report.connection_pool.status, ConnectionStatus::Disconnected);
    assert!(report.redis_info.is_empty());
    assert!(report.performance_metrics.ping_latency_ms.is_none());
    let error = report.error.unwrap();
    assert!(error.contains("Mock broker connection refused"), "{}", error);
}

#[tokio::test]
async fn test_open_circuit_is_offline_even_when_connected() {
    let (client, broker, _clock) = mock_client(test_config(2, Duration::from_secs(30), 1));

    broker.set_failure(true);
    for _ in 0..2 {
        let _ = client.publish("audit", b"x").await;
    }
    broker.set_failure(false);

    let report = client.health().await;

    assert_eq!(report.connection_pool.status, ConnectionStatus::Connected);
    assert_eq!(report.status, HealthStatus::Offline);
    let breaker = report.circuit_breaker.unwrap();
    assert_eq!(breaker.state, CircuitState::Open);
    assert_eq!(breaker.failure_count, 2);
    assert!(breaker.last_failure_time.is_some());
}

#[tokio::test]
async fn test_recent_failure_is_degraded() {
    let (client, broker, _clock) = mock_client(test_config(3, Duration::from_secs(1), 2));

    broker.set_failure(true);
    let _ = client.publish("audit", b"x").await;
    broker.set_failure(false);

    let report = client.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.circuit_breaker.unwrap().failure_count, 1);
}

#[tokio::test]
async fn test_half_open_is_degraded() {
    let (client, broker, clock) = mock_client(test_config(1, Duration::from_secs(1), 2));

    broker.set_failure(true);
    let _ = client.publish("audit", b"x").await;
    broker.set_failure(false);
    clock.advance(Duration::from_secs(1));
    assert!(client.publish("audit", b"x").await.is_ok());

    let report = client.health().await;
    assert_eq!(report.circuit_breaker.as_ref().unwrap().state, CircuitState::HalfOpen);
    assert_eq!(report.status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_server_info_failure_is_reported_not_fatal() {
    let (client, broker, _clock) = mock_client(test_config(3, Duration::from_secs(1), 2));
    broker.set_info_failure(true);

    let report = client.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.redis_info.is_empty());
    assert!(report.error.unwrap().contains("server info unavailable"));
}

#[tokio::test]
async fn test_unconstructable_client_is_offline() {
    let failure: Result<&crate::resilience::ResilientPubSubClient, PubSubError> = Err(
        PubSubError::Unavailable(BrokerError::Connection("Connection refused".to_string())),
    );

    let report = HealthAggregator::from_result(failure).snapshot().await;

    assert_eq!(report.status, HealthStatus::Offline);
    assert_eq!(report.connection_pool.status, ConnectionStatus::Disconnected);
    assert_eq!(report.connection_pool.max_connections, 0);
    assert!(report.redis_info.is_empty());
    assert!(report.circuit_breaker.is_none());
    assert!(report.performance_metrics.ping_latency_ms.is_none());
    assert!(report.error.unwrap().contains("Connection refused"));
}

#[tokio::test]
async fn test_report_json_shape() {
    let (client, _broker, _clock) = mock_client(test_config(3, Duration::from_secs(1), 2));

    let value = client.health().await.to_json().unwrap();

    assert_eq!(value["status"], json!("healthy"));
    assert!(value["timestamp"].is_string());
    assert_eq!(value["connection_pool"]["max_connections"], json!(10));
    assert_eq!(value["connection_pool"]["active_connections"], json!(2));
    assert_eq!(value["connection_pool"]["idle_connections"], json!(8));
    assert_eq!(value["connection_pool"]["status"], json!("connected"));
    assert!(value["performance_metrics"]["ping_latency_ms"].is_number());
    assert!(value["performance_metrics"]["last_successful_operation"].is_string());
    assert_eq!(value["redis_info"]["used_memory_human"], json!("1.05M"));
    assert_eq!(value["circuit_breaker"]["state"], json!("closed"));
    assert_eq!(value["circuit_breaker"]["failure_count"], json!(0));
    assert!(value["circuit_breaker"]["last_failure_time"].is_null());
    assert!(value.get("error").is_none(), "error omitted when healthy");
}

#[tokio::test]
async fn test_offline_json_keeps_field_names() {
    let value = HealthAggregator::unreachable("no route to host")
        .snapshot()
        .await
        .to_json()
        .unwrap();

    assert_eq!(value["status"], json!("offline"));
    assert_eq!(value["connection_pool"]["status"], json!("disconnected"));
    assert!(value["performance_metrics"]["ping_latency_ms"].is_null());
    assert_eq!(value["redis_info"], json!({}));
    assert!(value["circuit_breaker"].is_null());
    assert_eq!(value["error"], json!("no route to host"));
}
