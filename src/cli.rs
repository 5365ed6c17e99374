//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use fastget_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, parse_size};

/// Fast multi-connection HTTP downloader with resume.
///
/// Large files on servers that support byte ranges are fetched as parallel
/// segments; progress is saved next to the output so an interrupted download
/// picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "fastget")]
#[command(author, version, about)]
pub struct Args {
    /// Download URLs (one or more)
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Output file path (single URL) or directory (multiple URLs)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum concurrent connections per download (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub connections: u8,

    /// Segment size per connection, e.g. 4MB or 8MiB
    #[arg(short = 's', long, default_value = "8MB", value_parser = parse_chunk_size)]
    pub chunk_size: u64,

    /// Connect and read timeout in seconds
    #[arg(short = 't', long, default_value = "30", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Maximum retries per segment after the first attempt
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub retries: u32,

    /// Expected SHA-256 of the result (single URL only)
    #[arg(long = "hash", value_name = "SHA256")]
    pub expect_hash: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_chunk_size(value: &str) -> Result<u64, String> {
    match parse_size(value) {
        Ok(0) => Err("chunk size must be greater than zero".to_string()),
        Ok(bytes) => Ok(bytes),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("invalid timeout: {value}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("timeout must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}
