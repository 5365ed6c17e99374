//! Download configuration passed explicitly to every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
    MIN_CONCURRENCY, PROGRESS_INTERVAL, READ_TIMEOUT_SECS,
};
use super::engine::EngineError;
use super::retry::RetryPolicy;

/// Tunables for one download invocation.
///
/// Built once (usually from CLI flags) and handed to the engine, which threads
/// it through the prober, the segment fetchers and the fallback.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Width of each planned segment in bytes.
    pub chunk_size: u64,
    /// Maximum number of segment requests in flight.
    pub concurrency: usize,
    /// TCP/TLS connect timeout per request.
    pub connect_timeout: Duration,
    /// Maximum idle time between two body reads.
    pub read_timeout: Duration,
    /// Backoff policy shared by segment fetches and the single-stream fallback.
    pub retry: RetryPolicy,
    /// Minimum interval between two progress reports.
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            progress_interval: PROGRESS_INTERVAL,
        }
    }
}

impl DownloadConfig {
    /// Sets the segment width.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the connection limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Uses the same value for the connect and read timeouts.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.read_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidChunkSize`] for a zero chunk size and
    /// [`EngineError::InvalidConcurrency`] when the connection limit is
    /// outside 1-100.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidChunkSize);
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        Ok(())
    }
}

/// One resolved download: where the bytes come from and where they go.
///
/// Immutable once the segmented engine starts; `size` is the probed length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Requested URL, also the identity key of the resume side-file.
    pub url: String,
    /// Output file path.
    pub output: PathBuf,
    /// Total size in bytes as reported by the server.
    pub size: u64,
    /// Segment width used to plan this download.
    pub chunk_size: u64,
}

impl DownloadTarget {
    /// Creates a target for a probed resource.
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>, size: u64, chunk_size: u64) -> Self {
        Self {
            url: url.into(),
            output: output.as_ref().to_path_buf(),
            size,
            chunk_size,
        }
    }
}
