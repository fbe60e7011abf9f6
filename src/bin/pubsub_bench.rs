// src/bin/pubsub_bench.rs

use dotenv::dotenv;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use prettytable::{row, Table};
use rand::Rng;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tracing::{error, info};

use resilient_pubsub::config::RedisConfig;
use resilient_pubsub::error::PubSubError;
use resilient_pubsub::logging;
use resilient_pubsub::resilience::{ResilienceConfig, ResilientPubSubClient};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "pubsub_bench",
    about = "Publishes a burst of messages through the resilient client"
)]
struct Opt {
    /// Redis URL (overrides REDIS_URL)
    #[structopt(long)]
    redis_url: Option<String>,

    /// Channel to publish on
    #[structopt(long, default_value = "pubsub_bench")]
    channel: String,

    /// Number of messages to publish
    #[structopt(short = "n", long, default_value = "1000")]
    messages: usize,

    /// Maximum in-flight publishes
    #[structopt(short = "c", long, default_value = "50")]
    concurrency: usize,

    /// Payload size in bytes
    #[structopt(short = "s", long, default_value = "256")]
    payload_size: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,
}

#[derive(Debug, Default)]
struct Tally {
    delivered: usize,
    receivers: usize,
    circuit_open: usize,
    unavailable: usize,
    other: usize,
    latencies_ms: Vec<f64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    logging::init_with_default(&format!(
        "pubsub_bench={},resilient_pubsub={}",
        log_level, log_level
    ));

    let mut redis_config = RedisConfig::from_env()?;
    if let Some(url) = &opt.redis_url {
        redis_config.url = url.clone();
    }

    let client = match ResilientPubSubClient::connect(redis_config, ResilienceConfig::from_env()?)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Could not connect to the broker: {}", e);
            return Err(e.into());
        }
    };

    let mut payload = vec![0u8; opt.payload_size];
    rand::rng().fill(&mut payload[..]);

    info!(
        messages = opt.messages,
        concurrency = opt.concurrency,
        payload_size = opt.payload_size,
        "Starting publish benchmark"
    );

    let progress = ProgressBar::new(opt.messages as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({per_sec})",
        )?
        .progress_chars("=>-"),
    );

    let started = Instant::now();
    let outcomes: Vec<(f64, Result<usize, PubSubError>)> = stream::iter(0..opt.messages)
        .map(|_| {
            let client = &client;
            let payload = &payload;
            let channel = opt.channel.as_str();
            let progress = &progress;
            async move {
                let sent_at = Instant::now();
                let result = client.publish(channel, payload).await;
                progress.inc(1);
                (sent_at.elapsed().as_secs_f64() * 1000.0, result)
            }
        })
        .buffer_unordered(opt.concurrency.max(1))
        .collect()
        .await;
    let elapsed = started.elapsed();
    progress.finish_and_clear();

    let mut tally = Tally::default();
    for (latency_ms, result) in outcomes {
        match result {
            Ok(receivers) => {
                tally.delivered += 1;
                tally.receivers += receivers;
                tally.latencies_ms.push(latency_ms);
            }
            Err(PubSubError::CircuitOpen) => tally.circuit_open += 1,
            Err(PubSubError::Unavailable(_)) => tally.unavailable += 1,
            Err(_) => tally.other += 1,
        }
    }

    print_summary(&opt, &tally, elapsed);

    let report = client.health().await;
    println!("Broker health after run: {}", report.status);

    Ok(())
}

fn percentile(sorted: &[f64], pct: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[(sorted.len() * pct / 100).min(sorted.len() - 1)]
}

fn print_summary(opt: &Opt, tally: &Tally, elapsed: Duration) {
    let mut sorted = tally.latencies_ms.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let average = if sorted.is_empty() {
        0.0
    } else {
        sorted.iter().sum::<f64>() / sorted.len() as f64
    };
    let throughput = opt.messages as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    let mut table = Table::new();
    table.add_row(row!["Metric", "Value"]);
    table.add_row(row!["Messages", opt.messages]);
    table.add_row(row!["Delivered", tally.delivered]);
    table.add_row(row!["Receivers reached", tally.receivers]);
    table.add_row(row!["Rejected (circuit open)", tally.circuit_open]);
    table.add_row(row!["Failed (unavailable)", tally.unavailable]);
    table.add_row(row!["Other errors", tally.other]);
    table.add_row(row!["Duration", format!("{:?}", elapsed)]);
    table.add_row(row!["Throughput", format!("{:.2} msg/s", throughput)]);
    table.add_row(row!["Avg latency", format!("{:.3} ms", average)]);
    table.add_row(row!["p50 latency", format!("{:.3} ms", percentile(&sorted, 50))]);
    table.add_row(row!["p95 latency", format!("{:.3} ms", percentile(&sorted, 95))]);
    table.add_row(row!["p99 latency", format!("{:.3} ms", percentile(&sorted, 99))]);

    println!("\nBenchmark results for channel {:?}:", opt.channel);
    table.printstd();
}
