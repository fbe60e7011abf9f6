// src/resilience/mod.rs
//! Resilience features for the pub/sub broker client.
//!
//! 1. **Circuit Breaking** - Fail fast instead of piling up on a dead broker
//! 2. **Connection Monitoring** - Bounded reachability probes and pool/server introspection
//! 3. **Metrics** - Latest ping latency and last successful operation
//! 4. **Health Aggregation** - One `healthy` / `degraded` / `offline` verdict for diagnostics

mod circuit_breaker;
mod clock;
mod connection_monitor;
mod exponential_backoff;
mod health;
mod metrics;
mod resilient_client;

#[cfg(test)]
mod tests;

// Re-export key components
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connection_monitor::{
    ConnectionMonitor, ConnectionState, HealthCheckConfig, ServerSnapshot,
};
pub use exponential_backoff::{ExponentialBackoff, RetryConfig};
pub use health::{
    CircuitBreakerReport, ConnectionPoolReport, ConnectionStatus, HealthAggregator,
    HealthReport, HealthStatus, PerformanceReport,
};
pub use metrics::{MetricsCollector, MetricsSnapshot, OperationKind};
pub use resilient_client::{ResilienceConfig, ResilientPubSubClient};
