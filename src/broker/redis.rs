// src/broker/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, FromRedisValue, InfoDict};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, PoolStatus};
use crate::config::RedisConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::resilience::{ExponentialBackoff, RetryConfig};

/// Redis-backed broker client.
///
/// `ConnectionManager` multiplexes and reconnects on its own; the semaphore
/// caps concurrent calls at `pool_size` and is what pool occupancy reports on.
#[derive(Clone)]
pub struct RedisBroker {
    connection: ConnectionManager,
    permits: Arc<Semaphore>,
    config: RedisConfig,
}

// ConnectionManager has no useful Debug output
impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("url", &self.config.url)
            .field("pool_size", &self.config.pool_size)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl RedisBroker {
    /// Connects to Redis, failing if the first connection is not up within
    /// `connection_timeout`
    pub async fn connect(config: RedisConfig) -> BrokerResult<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())?;

        let connection_future = ConnectionManager::new(client);

        let connection =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(BrokerError::Connection(format!(
                        "Connection to Redis at {} timed out after {:?}",
                        config.url, config.connection_timeout
                    )));
                }
            };

        info!(url = %config.url, pool_size = config.pool_size, "Connected to Redis");

        Ok(Self {
            connection,
            permits: Arc::new(Semaphore::new(config.pool_size.max(1) as usize)),
            config,
        })
    }

    /// Like [`connect`](Self::connect), retrying with exponential backoff
    /// until the retry budget is spent
    pub async fn connect_with_retry(config: RedisConfig, retry: &RetryConfig) -> BrokerResult<Self> {
        let mut backoff = ExponentialBackoff::new(retry.clone());

        loop {
            match Self::connect(config.clone()).await {
                Ok(broker) => return Ok(broker),
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        warn!(
                            url = %config.url,
                            attempt = backoff.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            "Redis connection failed, retrying: {}",
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn acquire(&self) -> BrokerResult<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|e| BrokerError::Connection(format!("Connection pool closed: {}", e)))
    }
}

#[async_trait]
impl BrokerClient for RedisBroker {
    async fn publish(&self, channel: &str, payload: &[u8]) -> BrokerResult<usize> {
        let _permit = self.acquire().await?;
        let mut conn = self.connection.clone();

        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn ping(&self) -> BrokerResult<()> {
        let _permit = self.acquire().await?;
        let mut conn = self.connection.clone();

        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(BrokerError::UnexpectedReply(format!(
                "Unexpected response from Redis PING: {}",
                reply
            )))
        }
    }

    fn pool_status(&self) -> PoolStatus {
        let max_connections = self.config.pool_size.max(1) as usize;
        let idle_connections = self.permits.available_permits().min(max_connections);

        PoolStatus {
            max_connections,
            active_connections: max_connections - idle_connections,
            idle_connections,
        }
    }

    async fn server_info(&self) -> BrokerResult<BTreeMap<String, String>> {
        let _permit = self.acquire().await?;
        let mut conn = self.connection.clone();

        let info: InfoDict = redis::cmd("INFO").query_async(&mut conn).await?;
        let fields = info_fields(&info);

        debug!(fields = fields.len(), "Read Redis server info");
        Ok(fields)
    }
}

// every `field:value` line; InfoDict already skips section headers
fn info_fields(info: &InfoDict) -> BTreeMap<String, String> {
    info.iter()
        .filter_map(|(field, value)| {
            String::from_redis_value(value)
                .ok()
                .map(|value| (field.clone(), value))
        })
        .collect()
}
