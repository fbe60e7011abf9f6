use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerClient, RedisBroker};
use crate::config::{duration_serde, env_millis_or, RedisConfig};
use crate::error::{BrokerError, BrokerResult, PubSubError, Result};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::connection_monitor::{ConnectionMonitor, HealthCheckConfig};
use crate::resilience::exponential_backoff::RetryConfig;
use crate::resilience::health::{HealthAggregator, HealthReport};
use crate::resilience::metrics::{MetricsCollector, OperationKind};
use crate::{broker_op, circuit_rejected};

/// Combined configuration for resilience features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Circuit breaker configuration
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Connectivity probe configuration
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    /// Upper bound on every publish and ping
    #[serde(default = "default_operation_timeout", with = "duration_serde")]
    pub operation_timeout: Duration,
    /// Retries for the initial connection
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            health_check: HealthCheckConfig::default(),
            operation_timeout: default_operation_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Defaults overridden by `PUBSUB_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            circuit_breaker: CircuitBreakerConfig::from_env()?,
            operation_timeout: env_millis_or(
                "PUBSUB_OPERATION_TIMEOUT_MS",
                default_operation_timeout(),
            )?,
            ..Self::default()
        })
    }
}

/// Pub/sub client that stays usable while the broker is down.
///
/// Every publish and ping goes through the circuit breaker. While the
/// circuit is open calls fail fast with [`PubSubError::CircuitOpen`] and the
/// broker is never contacted.
///
/// ```plaintext
///   caller ──► publish / ping
///                   │
///                   ▼
///          ┌─────────────────┐   open    ┌─────────────┐
///          │ Circuit Breaker │──────────►│ CircuitOpen │
///          └─────────────────┘           └─────────────┘
///                   │ allowed
///                   ▼
///          ┌─────────────────┐  timeout / error  ┌─────────────┐
///          │  Broker (timed) │──────────────────►│ Unavailable │
///          └─────────────────┘                   └─────────────┘
///                   │
///                   ▼
///   record success, failure (transport only) + metrics
/// ```
///
/// The broker call runs on its own task. If the caller goes away mid-call
/// the task still finishes (or times out) and its outcome is recorded.
#[derive(Debug)]
pub struct ResilientPubSubClient {
    id: Uuid,
    broker: Arc<dyn BrokerClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    monitor: Arc<ConnectionMonitor>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
    config: ResilienceConfig,
}

impl ResilientPubSubClient {
    /// Connect to Redis and start background connectivity probing
    pub async fn connect(redis_config: RedisConfig, config: ResilienceConfig) -> Result<Self> {
        let broker = RedisBroker::connect_with_retry(redis_config, &config.retry).await?;
        let client = Self::new(Arc::new(broker), config);
        client.monitor.start();
        Ok(client)
    }

    pub fn new(broker: Arc<dyn BrokerClient>, config: ResilienceConfig) -> Self {
        Self::with_clock(broker, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        broker: Arc<dyn BrokerClient>,
        config: ResilienceConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let id = Uuid::new_v4();
        let circuit_breaker = Arc::new(CircuitBreaker::with_clock(
            config.circuit_breaker.clone(),
            Arc::clone(&clock),
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::clone(&broker),
            config.health_check.clone(),
        ));
        let metrics = Arc::new(MetricsCollector::with_clock(Arc::clone(&clock)));

        info!(client_id = %id, "Resilient pub/sub client created");

        Self {
            id,
            broker,
            circuit_breaker,
            monitor,
            metrics,
            clock,
            config,
        }
    }

    /// Publish `payload` on `channel`.
    ///
    /// Returns how many subscribers received it; zero is a success.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize> {
        if channel.trim().is_empty() {
            return Err(PubSubError::InvalidChannel(channel.to_string()));
        }

        let channel = channel.to_string();
        let payload = payload.to_vec();
        let (receivers, _) = self
            .guarded(OperationKind::Publish, move |broker| async move {
                broker.publish(&channel, &payload).await
            })
            .await?;

        Ok(receivers)
    }

    /// Ping the broker through the breaker; returns the round trip in ms
    pub async fn ping(&self) -> Result<f64> {
        let ((), elapsed_ms) = self
            .guarded(OperationKind::Ping, |broker| async move { broker.ping().await })
            .await?;

        Ok(elapsed_ms)
    }

    /// Probe reachability for health reporting. Skips the breaker, and a
    /// successful probe refreshes the ping latency.
    pub async fn check_connectivity(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// Same as [`check_connectivity`](Self::check_connectivity), keeping the
    /// probe's own error
    pub(crate) async fn probe(&self) -> Result<f64> {
        let outcome = self.monitor.probe().await;
        match &outcome {
            Ok(latency_ms) => {
                self.metrics
                    .record_operation(OperationKind::HealthCheck, *latency_ms, true)
                    .await;
            }
            Err(e) => debug!(client_id = %self.id, "Connectivity probe failed: {}", e),
        }
        outcome
    }

    pub async fn health(&self) -> HealthReport {
        HealthAggregator::new(self).snapshot().await
    }

    async fn guarded<T, F, Fut>(&self, kind: OperationKind, call: F) -> Result<(T, f64)>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn BrokerClient>) -> Fut,
        Fut: Future<Output = BrokerResult<T>> + Send + 'static,
    {
        if !self.circuit_breaker.allow_request().await {
            circuit_rejected!(self.id, kind.as_str());
            return Err(PubSubError::CircuitOpen);
        }

        let id = self.id;
        let timeout = self.config.operation_timeout;
        let breaker = Arc::clone(&self.circuit_breaker);
        let metrics = Arc::clone(&self.metrics);
        let call = call(Arc::clone(&self.broker));

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(BrokerError::Timeout {
                    operation: kind.as_str(),
                    timeout,
                }),
            };
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            // a broker that answers with an error is still reachable
            match &outcome {
                Ok(_) => breaker.record_success().await,
                Err(e) if e.is_transport() => breaker.record_failure().await,
                Err(_) => breaker.release_trial().await,
            }
            metrics
                .record_operation(kind, elapsed_ms, outcome.is_ok())
                .await;
            broker_op!(id, kind.as_str(), outcome.is_ok(), elapsed_ms);

            outcome.map(|value| (value, elapsed_ms))
        });

        match handle.await {
            Ok(outcome) => outcome.map_err(PubSubError::Unavailable),
            Err(e) => {
                // the task died before recording anything
                warn!(
                    client_id = %self.id,
                    operation = kind.as_str(),
                    "Broker call aborted: {}",
                    e
                );
                self.circuit_breaker.record_failure().await;
                self.metrics.record_operation(kind, 0.0, false).await;
                Err(PubSubError::Unavailable(BrokerError::TaskAborted(
                    e.to_string(),
                )))
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }
}

impl Drop for ResilientPubSubClient {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}
