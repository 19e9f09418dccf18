//! Bulk Log Shipper - ships stdin lines to an Elasticsearch-compatible backend
//!
//! Every non-empty line read from standard input becomes one log entry. Entries
//! are batched and written through the bulk API.
//!
//! ## Features
//!
//! - Size-based and time-based buffer flushing
//! - Basic, Kerberos and AWS SigV4 authentication
//! - Graceful shutdown on EOF or SIGINT, flushing what is buffered
//!
//! ## Configuration
//!
//! Configuration is loaded from `BULK_SHIPPER_*` environment variables, see
//! [`Config::from_env`](bulk_log_shipper::config::Config::from_env).
//!
//! - `BULK_SHIPPER_LOGGER`: logger name attached to each line (default: stdin)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bulk_log_shipper::buffer::LogShipper;
use bulk_log_shipper::config::Config;
use bulk_log_shipper::entry::LogRecord;

/// Logger name used when `BULK_SHIPPER_LOGGER` is unset
const DEFAULT_LOGGER: &str = "stdin";

/// Upper bound on the final flush
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting bulk log shipper...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                hosts = ?config.hosts.iter().map(ToString::to_string).collect::<Vec<_>>(),
                auth_type = %config.auth.auth_type(),
                buffer_size = config.buffer_size,
                flush_interval_ms = config.flush_interval.as_millis() as u64,
                index_name = %config.index_name,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let shipper = match LogShipper::new(config) {
        Ok(shipper) => shipper,
        Err(e) => {
            error!(error = %e, "Failed to create log shipper");
            std::process::exit(1);
        }
    };

    match shipper.test_connection().await {
        Ok(true) => info!("Backend reachable"),
        Ok(false) => warn!("Backend did not answer ping, entries will be buffered anyway"),
        Err(e) => {
            error!(error = %e, "Cannot build backend client");
            std::process::exit(1);
        }
    }

    let logger = std::env::var("BULK_SHIPPER_LOGGER").unwrap_or_else(|_| DEFAULT_LOGGER.to_string());

    info!("Reading log lines from stdin. Press Ctrl+C to stop.");
    tokio::select! {
        lines = ship_lines(&shipper, &logger) => {
            info!(lines = lines, "Input closed");
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    info!("Initiating graceful shutdown...");
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, shipper.close()).await {
        Ok(Ok(())) => info!("Buffer flushed"),
        Ok(Err(e)) => warn!(error = %e, "Final flush failed"),
        Err(_) => warn!("Final flush timed out after {:?}", SHUTDOWN_TIMEOUT),
    }

    let stats = shipper.stats();
    info!(
        received = stats.logs_received,
        flushed = stats.logs_flushed,
        dropped = stats.logs_dropped,
        "Bulk log shipper stopped"
    );

    // The stdin reader may still be parked in a blocking read
    std::process::exit(0);
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Diagnostics go to stderr so they never mix with piped input
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Record every stdin line until EOF. Returns the number of lines shipped.
async fn ship_lines(shipper: &LogShipper, logger: &str) -> u64 {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shipped: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                break;
            }
        };

        let Some(record) = line_record(&line, logger) else {
            continue;
        };

        if let Err(e) = shipper.record(record).await {
            warn!(error = %e, "Flush failed");
        }
        shipped += 1;
    }

    shipped
}

/// Build a record from one input line. Blank lines are skipped.
///
/// A leading `LEVEL:` prefix (e.g. `ERROR: disk full`) sets the level.
fn line_record(line: &str, logger: &str) -> Option<LogRecord> {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return None;
    }

    let (level, message) = match line.split_once(':') {
        Some((prefix, rest)) if is_level(prefix) => (prefix.to_string(), rest.trim_start()),
        _ => ("INFO".to_string(), line),
    };

    Some(
        LogRecord::now()
            .with_field("message", message)
            .with_field("logger", logger)
            .with_field("level", level),
    )
}

fn is_level(prefix: &str) -> bool {
    matches!(
        prefix,
        "DEBUG" | "INFO" | "WARNING" | "WARN" | "ERROR" | "CRITICAL"
    )
}
