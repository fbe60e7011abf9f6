use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::resilient_client::ResilientPubSubClient;

/// Overall broker health as reported to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Offline,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Offline => "offline",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPoolReport {
    pub max_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub ping_latency_ms: Option<f64>,
    pub last_successful_operation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerReport {
    pub state: CircuitState,
    pub failure_count: usize,
    pub last_failure_time: Option<DateTime<Utc>>,
}

/// Body of the broker health diagnostics endpoint. Field names are part of
/// the JSON contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub connection_pool: ConnectionPoolReport,
    pub performance_metrics: PerformanceReport,
    pub redis_info: BTreeMap<String, String>,
    pub circuit_breaker: Option<CircuitBreakerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

enum Source<'a> {
    Ready(&'a ResilientPubSubClient),
    Unreachable(String),
}

/// Reduces a client's connectivity, breaker and metrics into one report.
///
/// Never fails: problems end up in `status` and `error`.
pub struct HealthAggregator<'a> {
    source: Source<'a>,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(client: &'a ResilientPubSubClient) -> Self {
        Self {
            source: Source::Ready(client),
        }
    }

    /// For when the client could not be built at all
    pub fn unreachable(cause: impl fmt::Display) -> Self {
        Self {
            source: Source::Unreachable(cause.to_string()),
        }
    }

    pub fn from_result<E: fmt::Display>(
        client: std::result::Result<&'a ResilientPubSubClient, E>,
    ) -> Self {
        match client {
            Ok(client) => Self::new(client),
            Err(e) => Self::unreachable(e),
        }
    }

    /// Ordered: disconnected or open circuit is offline, half-open or any
    /// recent failure is degraded, anything else is healthy
    pub fn derive_status(
        connected: bool,
        breaker: CircuitState,
        failure_count: usize,
    ) -> HealthStatus {
        if !connected {
            return HealthStatus::Offline;
        }
        match breaker {
            CircuitState::Open => HealthStatus::Offline,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Closed if failure_count > 0 => HealthStatus::Degraded,
            CircuitState::Closed => HealthStatus::Healthy,
        }
    }

    pub async fn snapshot(&self) -> HealthReport {
        match &self.source {
            Source::Ready(client) => Self::collect(client).await,
            Source::Unreachable(cause) => HealthReport {
                status: HealthStatus::Offline,
                timestamp: Utc::now(),
                connection_pool: ConnectionPoolReport {
                    max_connections: 0,
                    active_connections: 0,
                    idle_connections: 0,
                    status: ConnectionStatus::Disconnected,
                },
                performance_metrics: PerformanceReport::default(),
                redis_info: BTreeMap::new(),
                circuit_breaker: None,
                error: Some(cause.clone()),
            },
        }
    }

    async fn collect(client: &ResilientPubSubClient) -> HealthReport {
        let mut errors = Vec::new();

        let connected = match client.probe().await {
            Ok(_) => true,
            Err(e) => {
                errors.push(e.to_string());
                false
            }
        };

        let pool = client.monitor().pool_snapshot();

        // no point waiting out another timeout on a dead broker
        let redis_info = if connected {
            let server = client.monitor().server_snapshot().await;
            errors.extend(server.error);
            server.info
        } else {
            BTreeMap::new()
        };

        let breaker = client.circuit_breaker().snapshot().await;
        let metrics = client.metrics().snapshot().await;

        HealthReport {
            status: Self::derive_status(connected, breaker.state, breaker.failure_count),
            timestamp: client.clock().now(),
            connection_pool: ConnectionPoolReport {
                max_connections: pool.max_connections,
                active_connections: pool.active_connections,
                idle_connections: pool.idle_connections,
                status: if connected {
                    ConnectionStatus::Connected
                } else {
                    ConnectionStatus::Disconnected
                },
            },
            performance_metrics: PerformanceReport {
                ping_latency_ms: metrics.ping_latency_ms,
                last_successful_operation: metrics.last_successful_operation,
            },
            redis_info,
            circuit_breaker: Some(CircuitBreakerReport {
                state: breaker.state,
                failure_count: breaker.failure_count,
                last_failure_time: breaker.last_failure_time,
            }),
            error: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
        }
    }
}
