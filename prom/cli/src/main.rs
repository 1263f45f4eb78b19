//! promq - Batched Prometheus Queries from the Command Line
//!
//! Runs every query given on the command line through a bounded
//! [`QueryContext`] and prints one JSON document per query, in the order the
//! queries were given. Failures are reported on stderr and turn the exit
//! status non-zero.
//!
//! # Usage
//!
//! ```bash
//! # Instant queries against the default endpoint
//! promq up 'sum(rate(http_requests_total[5m]))'
//!
//! # Range query over the last hour at one-minute resolution
//! promq --range 3600 --step 60 'rate(node_cpu_seconds_total[5m])'
//!
//! # Another server, at most four requests in flight
//! promq -e http://prometheus.monitoring:9090 -j 4 up
//!
//! # Verbose logging
//! RUST_LOG=debug promq up
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

use prom_query::{
    load_config, read_all, ConfigOverrides, HttpClient, QueryContext, QueryRange, QueryResults,
};

/// promq - Run PromQL queries with bounded concurrency
#[derive(Parser, Debug)]
#[command(name = "promq")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PromQL expressions to evaluate
    #[arg(required = true, value_name = "QUERY")]
    queries: Vec<String>,

    /// Prometheus base URL
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Maximum backend requests in flight
    #[arg(short = 'j', long, value_name = "N")]
    max_concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Evaluate over the last SECS seconds instead of at a single instant
    #[arg(short = 'r', long, value_name = "SECS")]
    range: Option<u64>,

    /// Resolution step in seconds for range queries
    #[arg(long, value_name = "SECS", default_value_t = 60, requires = "range")]
    step: u64,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PROM_QUERY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PROM_QUERY_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            max_concurrency: self.max_concurrency,
            request_timeout: self.timeout.map(Duration::from_secs),
        }
    }

    fn query_range(&self) -> Result<Option<QueryRange>> {
        let Some(secs) = self.range else {
            return Ok(None);
        };
        if self.step == 0 {
            anyhow::bail!("--step must be at least 1 second");
        }
        let window = chrono::Duration::try_seconds(
            i64::try_from(secs).context("--range is too large")?,
        )
        .context("--range is too large")?;

        let end = Utc::now();
        Ok(Some(QueryRange::new(
            end - window,
            end,
            Duration::from_secs(self.step),
        )))
    }
}

/// Initialize logging
///
/// Logs go to stderr so stdout carries only query results.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("promq={level},prom_query={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn render(results: &QueryResults, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(results)
    } else {
        serde_json::to_string(results)
    };
    rendered.with_context(|| format!("Failed to serialize results of {:?}", results.query))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load_config(args.config.as_deref(), &args.overrides())
        .context("Failed to load configuration")?;
    debug!(config = ?config, "Resolved configuration");

    let client = HttpClient::from_config(&config).context("Failed to create HTTP client")?;
    let ctx = QueryContext::from_config(client, &config);
    let range = args.query_range()?;

    info!(
        endpoint = %config.endpoint,
        queries = args.queries.len(),
        max_concurrency = config.max_concurrency,
        range = range.is_some(),
        "Dispatching queries"
    );

    let receivers = match range {
        Some(range) => ctx.query_range_all(args.queries.iter(), range),
        None => ctx.query_all(args.queries.iter()),
    };

    for results in read_all(receivers).await {
        println!("{}", render(&results, args.pretty)?);
    }

    let errors = ctx.errors();
    for error in &errors {
        eprintln!("error: {error}");
    }
    if !errors.is_empty() {
        anyhow::bail!("{} of {} queries failed", errors.len(), args.queries.len());
    }

    Ok(())
}
