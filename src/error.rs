// for error definitions
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the resilient client
#[derive(Error, Debug, Clone)]
pub enum PubSubError {
    /// The circuit breaker rejected the call; the broker was not contacted
    #[error("Circuit breaker is open, broker call skipped")]
    CircuitOpen,

    /// The broker call was attempted and failed or timed out
    #[error("Broker unavailable: {0}")]
    Unavailable(#[source] BrokerError),

    /// A health probe failed. Only produced on the health path.
    #[error("Broker health probe failed: {0}")]
    ProbeFailed(String),

    /// The caller supplied an unusable channel name
    #[error("Invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Health report rendering errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures reported by a broker client
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    Connection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    Auth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    Command(String),

    /// The broker did not answer within the allotted time
    #[error("Broker {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The broker answered with something we did not expect
    #[error("Unexpected broker reply: {0}")]
    UnexpectedReply(String),

    /// The task driving the broker call panicked or was aborted
    #[error("Broker task aborted: {0}")]
    TaskAborted(String),
}

impl BrokerError {
    /// Whether the failure came from the transport rather than the command itself
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection(_) | BrokerError::Timeout { .. } | BrokerError::TaskAborted(_)
        )
    }
}

// Classify redis::RedisError the same way for every broker call
impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => BrokerError::Auth(err.to_string()),
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                BrokerError::Connection(err.to_string())
            }
            _ if err.is_timeout() || err.is_connection_dropped() => {
                BrokerError::Connection(err.to_string())
            }
            _ => BrokerError::Command(err.to_string()),
        }
    }
}

impl From<BrokerError> for PubSubError {
    fn from(err: BrokerError) -> Self {
        PubSubError::Unavailable(err)
    }
}

impl From<serde_json::Error> for PubSubError {
    fn from(err: serde_json::Error) -> Self {
        PubSubError::Serialization(err.to_string())
    }
}

// define Result type aliases for convenience
pub type Result<T> = std::result::Result<T, PubSubError>;
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
