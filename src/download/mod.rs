//! Segmented, resumable HTTP download engine.
//!
//! This module splits a remote resource into byte-range segments, fetches them
//! concurrently into a pre-allocated output file and records completed
//! segments in a side-file so an interrupted transfer can resume.
//!
//! # Features
//!
//! - Capability probing (size, `Accept-Ranges` behavior, `ETag`/`Last-Modified`)
//! - Deterministic range planning shared by fresh and resumed runs
//! - Bounded concurrency with per-segment exponential backoff
//! - Conditional `If-Range` requests so a changed resource is detected
//! - Single-stream fallback for servers without range support
//!
//! # Example
//!
//! ```no_run
//! use fastget_core::download::{DownloadConfig, DownloadEngine};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(DownloadConfig::default())?;
//! let outcome = engine
//!     .download("https://example.com/image.iso", Path::new("image.iso"))
//!     .await?;
//! println!("Downloaded {} bytes to {}", outcome.bytes, outcome.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod constants;
mod engine;
mod error;
mod filename;
mod plan;
mod probe;
mod progress;
mod resume;
mod retry;
mod segment;

pub use client::HttpClient;
pub use config::{DownloadConfig, DownloadTarget};
pub use constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MAX_SEGMENTS, MIN_CONCURRENCY,
    RESUME_SUFFIX,
};
pub use engine::{DownloadEngine, DownloadMode, DownloadOutcome, EngineError, choose_mode};
pub use error::DownloadError;
pub use filename::default_name_from_url;
pub use plan::{Segment, plan_segments};
pub use probe::{Capabilities, Validators, probe};
pub use progress::{LogObserver, Progress, ProgressObserver, ProgressReport};
pub use resume::{ResumeMetadata, ResumeStore, resume_path, trust};
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_JITTER, FailureType, RetryDecision, RetryPolicy,
    classify_error,
};
pub use segment::{SegmentContext, SegmentMachine, SegmentState, fetch_segment};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
