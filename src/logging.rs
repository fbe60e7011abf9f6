use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Ensure initialization happens only once
static INIT: Once = Once::new();

/// Initialize the logging system with sensible defaults.
///
/// Log level can be set using the RUST_LOG environment variable.
/// Example: RUST_LOG=debug,resilient_pubsub=trace
pub fn init() {
    init_with_default("info");
}

/// Same as [`init`], but with a caller-chosen filter when RUST_LOG is unset.
pub fn init_with_default(default_filter: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true) // concurrent publishers share one client
                    .with_line_number(true),
            )
            .init();

        tracing::info!("Logging initialized");
    });
}

/// Macro for logging a single broker call with timing
#[macro_export]
macro_rules! broker_op {
    ($client:expr, $operation:expr, $success:expr, $elapsed_ms:expr) => {
        tracing::debug!(
            client_id = %$client,
            operation = $operation,
            success = $success,
            elapsed_ms = $elapsed_ms,
            "Broker operation"
        )
    };
}

/// Macro for logging a call rejected by the circuit breaker
#[macro_export]
macro_rules! circuit_rejected {
    ($client:expr, $operation:expr) => {
        tracing::debug!(
            client_id = %$client,
            operation = $operation,
            "Circuit open, skipping broker call"
        )
    };
}
