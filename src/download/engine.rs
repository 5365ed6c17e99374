//! Download engine: probes a URL and picks the segmented or single-stream path.
//!
//! This module provides the `DownloadEngine`, which owns the configuration,
//! the shared HTTP client and the progress observer for every download it runs.
//!
//! # Overview
//!
//! 1. [`probe`] the URL for size, range support and validators
//! 2. [`choose_mode`]: segmented when the size is known, ranges are supported
//!    and the resource is larger than one chunk; single stream otherwise
//! 3. run the chosen path and report a [`DownloadOutcome`]
//!
//! # Example
//!
//! ```no_run
//! use fastget_core::download::{DownloadConfig, DownloadEngine};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(DownloadConfig::default().with_concurrency(8))?;
//! let outcome = engine
//!     .download("https://example.com/file.iso", Path::new("file.iso"))
//!     .await?;
//! println!("{} bytes via {:?}", outcome.bytes, outcome.mode);
//! # Ok(())
//! # }
//! ```

mod segmented;
mod single_stream;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::config::{DownloadConfig, DownloadTarget};
use super::constants::{MAX_CONCURRENCY, MAX_SEGMENTS, MIN_CONCURRENCY};
use super::probe::{Capabilities, probe};
use super::progress::{LogObserver, ProgressObserver};
use super::{DownloadError, HttpClient};

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Chunk size of zero.
    #[error("invalid chunk size: must be greater than zero")]
    InvalidChunkSize,

    /// The declared size would split into more segments than one plan may hold.
    #[error(
        "{size} bytes in chunks of {chunk_size} needs {count} segments, more than the limit of {MAX_SEGMENTS}"
    )]
    TooManySegments {
        /// Size the server declared.
        size: u64,
        /// Configured segment width.
        chunk_size: u64,
        /// Segments the plan would need.
        count: u64,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,

    /// A segment task panicked or was cancelled.
    #[error("download task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The download itself failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Which transfer path a download takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Concurrent ranged requests into a pre-allocated file.
    Segmented {
        /// Probed total size.
        size: u64,
    },
    /// One sequential GET from the start.
    SingleStream,
}

/// Picks the transfer path from probe results.
///
/// Segmented only when the size is known, a range probe returned `206` and the
/// resource is larger than one chunk.
#[must_use]
pub fn choose_mode(caps: &Capabilities, chunk_size: u64) -> DownloadMode {
    match caps.size {
        Some(size) if caps.supports_ranges && size > chunk_size => {
            DownloadMode::Segmented { size }
        }
        _ => DownloadMode::SingleStream,
    }
}

/// Summary of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Output file path.
    pub path: PathBuf,
    /// Final file size.
    pub bytes: u64,
    /// Path that was taken.
    pub mode: DownloadMode,
    /// Segments skipped because a previous run had completed them.
    pub resumed_segments: usize,
    /// Segments fetched by this run.
    pub fetched_segments: usize,
}

/// Engine for one or more downloads sharing a configuration and HTTP client.
///
/// # Concurrency Model
///
/// - Each segment runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each segment task
/// - Permits are released automatically when segments complete (RAII)
/// - After the first fatal segment error no new segment is started
pub struct DownloadEngine {
    config: DownloadConfig,
    client: HttpClient,
    observer: Arc<dyn ProgressObserver>,
}

impl fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("config", &self.config)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] or
    /// [`EngineError::InvalidChunkSize`] for invalid settings and
    /// [`EngineError::Client`] if the HTTP client cannot be built.
    ///
    /// # Example
    ///
    /// ```
    /// use fastget_core::download::{DownloadConfig, DownloadEngine};
    ///
    /// let engine = DownloadEngine::new(DownloadConfig::default()).unwrap();
    /// assert_eq!(engine.config().concurrency, 16);
    /// ```
    #[instrument(level = "debug", skip(config))]
    pub fn new(config: DownloadConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let client = HttpClient::new(&config).map_err(EngineError::Client)?;

        debug!(
            concurrency = config.concurrency,
            chunk_size = config.chunk_size,
            max_retries = config.retry.max_retries(),
            "creating download engine"
        );

        Ok(Self {
            config,
            client,
            observer: Arc::new(LogObserver),
        })
    }

    /// Replaces the default log-based progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `url` to `output`, resuming a previous segmented run when its
    /// side-file is still valid.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Download`] when probing fails fatally, when a
    /// segment cannot be completed, or when the single-stream fallback runs out
    /// of retries; [`EngineError::TooManySegments`] when the declared size is
    /// too large to plan; [`EngineError::Join`] if a segment task panics.
    #[instrument(skip(self, output), fields(output = %output.display()))]
    pub async fn download(&self, url: &str, output: &Path) -> Result<DownloadOutcome, EngineError> {
        let caps = probe(&self.client, url).await?;
        let mode = choose_mode(&caps, self.config.chunk_size);

        match mode {
            DownloadMode::Segmented { size } => {
                info!(
                    size,
                    chunk_size = self.config.chunk_size,
                    connections = self.config.concurrency,
                    "segmented mode"
                );
                let target = DownloadTarget::new(url, output, size, self.config.chunk_size);
                let report = segmented::run(self, &target, &caps.validators).await?;
                Ok(DownloadOutcome {
                    path: output.to_path_buf(),
                    bytes: size,
                    mode,
                    resumed_segments: report.resumed,
                    fetched_segments: report.fetched,
                })
            }
            DownloadMode::SingleStream => {
                info!(
                    size = ?caps.size,
                    supports_ranges = caps.supports_ranges,
                    "ranges unsupported or resource small, using single stream"
                );
                let bytes = single_stream::run(self, url, output).await?;
                Ok(DownloadOutcome {
                    path: output.to_path_buf(),
                    bytes,
                    mode,
                    resumed_segments: 0,
                    fetched_segments: 0,
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::probe::Validators;

    fn caps(size: Option<u64>, supports_ranges: bool) -> Capabilities {
        Capabilities {
            size,
            supports_ranges,
            validators: Validators::default(),
        }
    }

    #[test]
    fn test_choose_mode_segmented_when_all_conditions_hold() {
        assert_eq!(
            choose_mode(&caps(Some(101), true), 100),
            DownloadMode::Segmented { size: 101 }
        );
    }

    #[test]
    fn test_choose_mode_single_stream_otherwise() {
        assert_eq!(choose_mode(&caps(Some(101), false), 100), DownloadMode::SingleStream);
        assert_eq!(choose_mode(&caps(None, true), 100), DownloadMode::SingleStream);
        assert_eq!(choose_mode(&caps(Some(100), true), 100), DownloadMode::SingleStream);
        assert_eq!(choose_mode(&caps(Some(0), true), 100), DownloadMode::SingleStream);
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, 16, 100] {
            let engine = DownloadEngine::new(DownloadConfig::default().with_concurrency(value)).unwrap();
            assert_eq!(engine.config().concurrency, value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency_zero() {
        let result = DownloadEngine::new(DownloadConfig::default().with_concurrency(0));
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_engine_error_display_names_bounds() {
        let error = EngineError::InvalidConcurrency { value: 101 };
        let msg = error.to_string();
        assert!(msg.contains("101"));
        assert!(msg.contains("between 1 and 100"));
    }

    #[test]
    fn test_engine_error_wraps_download_error_transparently() {
        let error = EngineError::from(DownloadError::timeout("http://example.com"));
        assert_eq!(error.to_string(), "timeout fetching http://example.com");
    }
}
