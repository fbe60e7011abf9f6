// src/test_utils.rs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::broker::{BrokerClient, PoolStatus};
use crate::error::{BrokerError, BrokerResult};
use crate::resilience::{
    CircuitBreakerConfig, HealthCheckConfig, ManualClock, ResilienceConfig, ResilientPubSubClient,
};

/// Scriptable broker double that counts every call it receives
#[derive(Debug)]
pub struct MockBroker {
    should_fail: AtomicBool,
    info_should_fail: AtomicBool,
    should_reject: AtomicBool,
    should_panic: AtomicBool,
    delay_ms: AtomicU64,
    subscribers: AtomicUsize,
    publish_calls: AtomicUsize,
    ping_calls: AtomicUsize,
    pool: PoolStatus,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            info_should_fail: AtomicBool::new(false),
            should_reject: AtomicBool::new(false),
            should_panic: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            subscribers: AtomicUsize::new(1),
            publish_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            pool: PoolStatus {
                max_connections: 10,
                active_connections: 2,
                idle_connections: 8,
            },
        }
    }

    pub fn set_failure(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    pub fn set_info_failure(&self, should_fail: bool) {
        self.info_should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Publish and ping reach the broker but it refuses the command
    pub fn set_reject(&self, should_reject: bool) {
        self.should_reject.store(should_reject, Ordering::SeqCst);
    }

    /// Publish and ping panic, as a buggy driver would
    pub fn set_panic(&self, should_panic: bool) {
        self.should_panic.store(should_panic, Ordering::SeqCst);
    }

    /// Every call sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_subscribers(&self, subscribers: usize) {
        self.subscribers.store(subscribers, Ordering::SeqCst);
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> BrokerResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection(
                "Mock broker connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self) -> BrokerResult<()> {
        self.simulate().await?;

        if self.should_panic.load(Ordering::SeqCst) {
            panic!("mock broker driver bug");
        }
        if self.should_reject.load(Ordering::SeqCst) {
            return Err(BrokerError::Command(
                "NOPERM this user has no permissions to run the command".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn publish(&self, _channel: &str, _payload: &[u8]) -> BrokerResult<usize> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.execute().await?;
        Ok(self.subscribers.load(Ordering::SeqCst))
    }

    async fn ping(&self) -> BrokerResult<()> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        self.execute().await
    }

    fn pool_status(&self) -> PoolStatus {
        self.pool
    }

    async fn server_info(&self) -> BrokerResult<BTreeMap<String, String>> {
        self.simulate().await?;
        if self.info_should_fail.load(Ordering::SeqCst) {
            return Err(BrokerError::Command("ERR unknown command 'INFO'".to_string()));
        }

        let mut info = BTreeMap::new();
        info.insert("redis_version".to_string(), "7.2.4".to_string());
        info.insert("uptime_in_seconds".to_string(), "3600".to_string());
        info.insert("used_memory_human".to_string(), "1.05M".to_string());
        info.insert("connected_clients".to_string(), "3".to_string());
        Ok(info)
    }
}

/// Resilience settings with short timeouts for tests
pub fn test_config(
    failure_threshold: usize,
    recovery_timeout: Duration,
    success_threshold: usize,
) -> ResilienceConfig {
    ResilienceConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout,
            success_threshold,
        },
        health_check: HealthCheckConfig {
            check_interval: Duration::from_millis(50),
            check_timeout: Duration::from_millis(100),
        },
        operation_timeout: Duration::from_millis(200),
        ..ResilienceConfig::default()
    }
}

/// Client over a fresh mock broker and a manual clock
pub fn mock_client(
    config: ResilienceConfig,
) -> (ResilientPubSubClient, Arc<MockBroker>, Arc<ManualClock>) {
    let broker = Arc::new(MockBroker::new());
    let clock = Arc::new(ManualClock::starting_now());
    let client = ResilientPubSubClient::with_clock(broker.clone(), config, clock.clone());
    (client, broker, clock)
}
