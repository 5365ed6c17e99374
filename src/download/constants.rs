//! Constants for the download module (timeouts, chunking, backoff).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (30 seconds between body chunks).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default segment width (8 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Default number of concurrently in-flight segment requests.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Upper bound on the number of segments in one plan.
///
/// 8 TiB at the default chunk size. A larger plan is refused before any
/// memory or disk space is reserved for it.
pub const MAX_SEGMENTS: u64 = 1 << 20;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Minimum interval between two rendered progress lines.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Suffix appended to the output path for the resume side-file.
pub const RESUME_SUFFIX: &str = ".meta.json";

/// Name used when a URL has no usable final path segment.
pub const FALLBACK_FILENAME: &str = "download.bin";
