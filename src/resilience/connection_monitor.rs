use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task;
use tokio::time;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, PoolStatus};
use crate::config::duration_serde;
use crate::error::{PubSubError, Result};

/// Configuration for connectivity probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// How often the background task probes the broker
    #[serde(with = "duration_serde")]
    pub check_interval: Duration,
    /// Timeout for a single probe or server info read
    #[serde(with = "duration_serde")]
    pub check_timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            check_timeout: Duration::from_secs(1),
        }
    }
}

/// Best-effort broker metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSnapshot {
    pub info: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// Reachability flag and the error that goes with it, always written together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_error: Option<String>,
}

/// Watches broker reachability and exposes pool and server introspection.
///
/// Nothing here returns an error for an unreachable broker: probes come back
/// as `false` with the detail kept in [`last_error`](Self::last_error).
#[derive(Debug)]
pub struct ConnectionMonitor {
    broker: Arc<dyn BrokerClient>,
    state: Arc<RwLock<ConnectionState>>,
    // mirrors `state.connected` for lock-free reads; only written under the write lock
    is_connected: Arc<AtomicBool>,
    config: HealthCheckConfig,
    cancel_flag: Arc<AtomicBool>,
}

impl ConnectionMonitor {
    /// The broker handle is assumed reachable until a probe says otherwise
    pub fn new(broker: Arc<dyn BrokerClient>, config: HealthCheckConfig) -> Self {
        Self {
            broker,
            state: Arc::new(RwLock::new(ConnectionState {
                connected: true,
                last_error: None,
            })),
            is_connected: Arc::new(AtomicBool::new(true)),
            config,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ping the broker once, bounded by `check_timeout`.
    ///
    /// Returns the round trip in milliseconds, or `ProbeFailed`.
    pub async fn probe(&self) -> Result<f64> {
        let outcome = run_probe(self.broker.as_ref(), self.config.check_timeout).await;
        record_probe(&self.state, &self.is_connected, &outcome).await;
        outcome
    }

    pub async fn check_connectivity(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// Last observed reachability
    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }

    /// Detail of the latest failed probe, cleared by the next good one
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Flag and error from the same probe
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    pub fn pool_snapshot(&self) -> PoolStatus {
        self.broker.pool_status()
    }

    pub async fn server_snapshot(&self) -> ServerSnapshot {
        let timeout = self.config.check_timeout;

        match time::timeout(timeout, self.broker.server_info()).await {
            Ok(Ok(info)) => ServerSnapshot { info, error: None },
            Ok(Err(e)) => {
                warn!("Reading broker server info failed: {}", e);
                ServerSnapshot {
                    info: BTreeMap::new(),
                    error: Some(format!("server info unavailable: {}", e)),
                }
            }
            Err(_) => {
                warn!("Reading broker server info timed out after {:?}", timeout);
                ServerSnapshot {
                    info: BTreeMap::new(),
                    error: Some(format!("server info timed out after {:?}", timeout)),
                }
            }
        }
    }

    /// Start probing in the background every `check_interval`
    pub fn start(&self) -> task::JoinHandle<()> {
        let broker = Arc::clone(&self.broker);
        let state = Arc::clone(&self.state);
        let is_connected = Arc::clone(&self.is_connected);
        let interval = self.config.check_interval;
        let timeout = self.config.check_timeout;
        let cancel_flag = Arc::clone(&self.cancel_flag);

        task::spawn(async move {
            let mut interval_timer = time::interval(interval);

            loop {
                interval_timer.tick().await;

                if cancel_flag.load(Ordering::SeqCst) {
                    break;
                }

                let outcome = run_probe(broker.as_ref(), timeout).await;
                record_probe(&state, &is_connected, &outcome).await;
            }

            debug!("Connection monitor task stopped");
        })
    }

    /// Stop the background task after its current tick
    pub fn stop(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }
}

async fn run_probe(broker: &dyn BrokerClient, timeout: Duration) -> Result<f64> {
    let started = Instant::now();

    match time::timeout(timeout, broker.ping()).await {
        Ok(Ok(())) => Ok(started.elapsed().as_secs_f64() * 1000.0),
        Ok(Err(e)) => Err(PubSubError::ProbeFailed(e.to_string())),
        Err(_) => Err(PubSubError::ProbeFailed(format!(
            "ping timed out after {:?}",
            timeout
        ))),
    }
}

async fn record_probe(
    state: &RwLock<ConnectionState>,
    is_connected: &AtomicBool,
    outcome: &Result<f64>,
) {
    let reachable = outcome.is_ok();

    let mut state = state.write().await;
    let previous = state.connected;
    state.connected = reachable;
    state.last_error = outcome.as_ref().err().map(|e| e.to_string());
    is_connected.store(reachable, Ordering::SeqCst);
    drop(state);

    match outcome {
        Ok(_) if !previous => info!("Broker is reachable again"),
        Err(e) if previous => warn!("Broker is unreachable: {}", e),
        _ => {}
    }
}
