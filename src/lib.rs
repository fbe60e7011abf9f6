// library entry
pub mod broker;
pub mod config;
pub mod error;
pub mod logging;
pub mod resilience;

#[cfg(test)]
mod test_utils;

// Re-export key components for convenience
pub use broker::{BrokerClient, PoolStatus, RedisBroker};
pub use error::{BrokerError, PubSubError, Result};
pub use logging::init as init_logging;
pub use resilience::{HealthAggregator, HealthReport, HealthStatus, ResilientPubSubClient};
