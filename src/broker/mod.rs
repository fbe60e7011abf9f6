// src/broker/mod.rs

pub mod redis;

pub use self::redis::RedisBroker;

use super::error::BrokerResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Occupancy of the broker connection pool at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
}

/// Core trait every pub/sub broker client must implement.
///
/// Any call may fail with a transport error or hang; callers are expected to
/// bound each call with their own timeout.
#[async_trait]
pub trait BrokerClient: Send + Sync + Debug {
    // Publishes a payload and returns how many subscribers received it
    async fn publish(&self, channel: &str, payload: &[u8]) -> BrokerResult<usize>;

    // Round-trip reachability check
    async fn ping(&self) -> BrokerResult<()>;

    // Reads current pool occupancy without changing it
    fn pool_status(&self) -> PoolStatus;

    // Everything the broker reports about itself, field to value
    async fn server_info(&self) -> BrokerResult<BTreeMap<String, String>>;
}
