//! Fastget Core Library
//!
//! This library provides the core functionality for the `fastget` tool, a
//! resumable multi-connection HTTP downloader.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Probing, range planning, segment fetching, resume state
//! - [`units`] - Human-readable size parsing and byte formatting
//! - [`verify`] - SHA-256 verification of finished downloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod download;
pub mod units;
mod user_agent;
pub mod verify;

// Re-export commonly used types
pub use download::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadConfig, DownloadEngine,
    DownloadError, DownloadMode, DownloadOutcome, EngineError, ProgressObserver, ProgressReport,
    RetryPolicy, default_name_from_url,
};
pub use units::{SizeParseError, format_bytes, parse_size};
pub use verify::{VerifyError, sha256_file, verify_sha256};
