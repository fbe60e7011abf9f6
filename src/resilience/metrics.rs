//! Operation metrics for the resilient client.
//!
//! Keeps only the latest values and running totals. Averages and
//! percentiles over a window are left to whoever drives the client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::resilience::clock::{Clock, SystemClock};

/// What kind of broker call a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Publish,
    Ping,
    /// Health check; refreshes latency without counting as traffic
    HealthCheck,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Publish => "publish",
            OperationKind::Ping => "ping",
            OperationKind::HealthCheck => "health_check",
        }
    }
}

/// Copy of the collector's state at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Latest successful ping round trip. `None` until one has been measured.
    pub ping_latency_ms: Option<f64>,
    pub last_successful_operation: Option<DateTime<Utc>>,
    pub total_operations: u64,
    pub failed_operations: u64,
}

#[derive(Debug)]
pub struct MetricsCollector {
    state: RwLock<MetricsSnapshot>,
    clock: Arc<dyn Clock>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(MetricsSnapshot::default()),
            clock,
        }
    }

    /// Record one finished broker call.
    ///
    /// Ping latency only moves on successful pings and health checks; a failed
    /// ping measures the timeout, not the broker. Health checks stay out of
    /// the totals.
    pub async fn record_operation(&self, kind: OperationKind, duration_ms: f64, success: bool) {
        let duration_ms = if duration_ms.is_finite() {
            duration_ms.max(0.0)
        } else {
            0.0
        };
        let now = self.clock.now();

        let mut state = self.state.write().await;
        if kind != OperationKind::HealthCheck {
            state.total_operations += 1;
            if !success {
                state.failed_operations += 1;
            }
        }

        if success {
            state.last_successful_operation = Some(now);
            if kind != OperationKind::Publish {
                state.ping_latency_ms = Some(duration_ms);
            }
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.state.read().await.clone()
    }
}
