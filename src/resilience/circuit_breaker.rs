use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{duration_serde, env_millis_or, env_or};
use crate::error::Result;
use crate::resilience::clock::{add_duration, Clock, SystemClock};

/// The state of the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are failing and not being sent
    Open,
    /// A trial succeeded and more are needed before closing
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// How long the circuit stays open before a trial call is let through
    #[serde(with = "duration_serde")]
    pub recovery_timeout: Duration,
    /// Number of consecutive successes needed to close the circuit again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Reads `PUBSUB_FAILURE_THRESHOLD`, `PUBSUB_SUCCESS_THRESHOLD` and
    /// `PUBSUB_RECOVERY_TIMEOUT_MS` over the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            failure_threshold: env_or("PUBSUB_FAILURE_THRESHOLD", defaults.failure_threshold)?
                .max(1),
            recovery_timeout: env_millis_or(
                "PUBSUB_RECOVERY_TIMEOUT_MS",
                defaults.recovery_timeout,
            )?,
            success_threshold: env_or("PUBSUB_SUCCESS_THRESHOLD", defaults.success_threshold)?
                .max(1),
        })
    }
}

/// Point-in-time view of the breaker, read under a single lock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: usize,
    pub success_count: usize,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: usize,
    success_count: usize,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    // the one trial call of the current open period has been handed out
    trial_issued: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
            trial_issued: false,
        }
    }
}

/// Circuit breaker implementation.
///
/// All state sits behind one mutex so a transition is never observed half
/// applied. The breaker only answers questions; deciding what counts as a
/// failure is up to the caller.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(BreakerState::closed()),
            config,
            clock,
        }
    }

    /// Check if the circuit breaker allows the request to proceed.
    ///
    /// Once the recovery timeout has passed an open circuit lets exactly one
    /// trial through. The state itself only changes when that trial's result
    /// is recorded.
    pub async fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = self.clock.now();
                match inner.next_attempt_time {
                    Some(next) if now >= next && !inner.trial_issued => {
                        inner.trial_issued = true;
                        debug!("Recovery timeout elapsed, allowing trial call");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Record a successful operation
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {
                // the trial came back fine
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.trial_issued = false;
                debug!("Trial call succeeded, circuit breaker half-open");
                self.half_open_success(&mut inner);
            }
            CircuitState::HalfOpen => self.half_open_success(&mut inner),
        }
    }

    fn half_open_success(&self, inner: &mut BreakerState) {
        inner.success_count += 1;

        if inner.success_count >= self.config.success_threshold {
            inner.state = CircuitState::Closed;
            inner.success_count = 0;
            inner.failure_count = 0;
            inner.next_attempt_time = None;
            info!(
                "Circuit breaker closed after {} successful trial calls",
                self.config.success_threshold
            );
        }
    }

    /// Record a failed operation
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        let now = self.clock.now();
        inner.failure_count = inner.failure_count.saturating_add(1);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner, now);
                    warn!(
                        "Circuit breaker opened after {} consecutive failures",
                        inner.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open state opens the circuit again
                self.trip(&mut inner, now);
                warn!("Circuit breaker re-opened after failure in half-open state");
            }
            CircuitState::Open => {
                // push the deadline out, never pull it in
                let extended = add_duration(now, self.config.recovery_timeout);
                inner.last_failure_time = Some(now);
                inner.next_attempt_time = Some(match inner.next_attempt_time {
                    Some(next) if next > extended => next,
                    _ => extended,
                });
                inner.trial_issued = false;
                debug!("Failure recorded while open, recovery deadline extended");
            }
        }
    }

    /// Give back an open-period trial whose call ended without a verdict on
    /// the broker's health
    pub async fn release_trial(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::Open && inner.trial_issued {
            inner.trial_issued = false;
            debug!("Trial call inconclusive, next call may try again");
        }
    }

    fn trip(&self, inner: &mut BreakerState, now: DateTime<Utc>) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.trial_issued = false;
        inner.last_failure_time = Some(now);
        inner.next_attempt_time = Some(add_duration(now, self.config.recovery_timeout));
    }

    /// Get the current state of the circuit breaker
    pub async fn get_state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.inner.lock().await;
        CircuitBreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            next_attempt_time: inner.next_attempt_time,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
