// src/bin/pubsub_health.rs

use dotenv::dotenv;
use prettytable::{row, Table};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::time;
use tracing::{info, warn};

use resilient_pubsub::config::RedisConfig;
use resilient_pubsub::logging;
use resilient_pubsub::resilience::{
    HealthAggregator, HealthReport, HealthStatus, ResilienceConfig, ResilientPubSubClient,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "pubsub_health",
    about = "Reports the health of the pub/sub broker connection"
)]
struct Opt {
    /// Redis URL (overrides REDIS_URL)
    #[structopt(long)]
    redis_url: Option<String>,

    /// Output format
    #[structopt(short, long, possible_values = &["json", "table"], default_value = "json")]
    format: String,

    /// Re-check every N seconds until interrupted
    #[structopt(short, long)]
    watch: Option<u64>,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    logging::init_with_default(&format!(
        "pubsub_health={},resilient_pubsub={}",
        log_level, log_level
    ));

    let mut redis_config = RedisConfig::from_env()?;
    if let Some(url) = &opt.redis_url {
        redis_config.url = url.clone();
    }
    let resilience_config = ResilienceConfig::from_env()?;

    let mut client =
        ResilientPubSubClient::connect(redis_config.clone(), resilience_config.clone()).await;

    let Some(interval) = opt.watch else {
        let report = HealthAggregator::from_result(client.as_ref()).snapshot().await;
        render(&report, &opt.format)?;
        if report.status == HealthStatus::Offline {
            std::process::exit(1);
        }
        return Ok(());
    };

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))?;

    info!(interval_secs = interval, "Watching broker health, Ctrl-C to stop");

    while running.load(Ordering::SeqCst) {
        if let Err(e) = &client {
            warn!("Broker client unavailable, reconnecting: {}", e);
            client =
                ResilientPubSubClient::connect(redis_config.clone(), resilience_config.clone())
                    .await;
        }

        let report = HealthAggregator::from_result(client.as_ref()).snapshot().await;
        render(&report, &opt.format)?;

        time::sleep(Duration::from_secs(interval.max(1))).await;
    }

    Ok(())
}

fn render(report: &HealthReport, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if format == "json" {
        println!("{}", report.to_json_pretty()?);
        return Ok(());
    }

    let pool = &report.connection_pool;
    let metrics = &report.performance_metrics;
    let mut table = Table::new();
    table.add_row(row!["Status", report.status]);
    table.add_row(row!["Checked at", report.timestamp.to_rfc3339()]);
    table.add_row(row![
        "Connection",
        format!(
            "{:?} ({} active / {} idle / {} max)",
            pool.status, pool.active_connections, pool.idle_connections, pool.max_connections
        )
    ]);
    table.add_row(row![
        "Ping latency",
        metrics
            .ping_latency_ms
            .map(|ms| format!("{:.3} ms", ms))
            .unwrap_or_else(|| "-".to_string())
    ]);
    table.add_row(row![
        "Last success",
        metrics
            .last_successful_operation
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    ]);
    if let Some(breaker) = &report.circuit_breaker {
        table.add_row(row![
            "Circuit breaker",
            format!("{} ({} failures)", breaker.state.as_str(), breaker.failure_count)
        ]);
    }
    for (field, value) in &report.redis_info {
        table.add_row(row![field, value]);
    }
    if let Some(error) = &report.error {
        table.add_row(row!["Error", error]);
    }

    table.printstd();
    Ok(())
}
