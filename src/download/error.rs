//! Errors raised while probing a resource or writing its bytes.
//!
//! Every variant carries the URL or path it concerns; there are no blanket
//! `From` conversions for `reqwest` or IO errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while probing or fetching a resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection could not be made or broke off.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read timed out.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// A status the current step does not accept.
    #[error("unexpected HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unparseable, or a scheme other than http/https.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Body length does not match the length the server declared.
    #[error("short body for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },

    /// The server answered a range request in a way that cannot be written safely.
    #[error("protocol violation from {url}: {detail}")]
    ProtocolViolation {
        /// The URL that misbehaved.
        url: String,
        /// What was wrong with the response.
        detail: String,
    },

    /// A ranged segment request came back as a full `200` body.
    ///
    /// Either the server stopped honoring ranges or the `If-Range` validator
    /// no longer matches the current representation.
    #[error("resource at {url} changed or ignored the range request for bytes {start}-{end}")]
    ResourceChanged {
        /// The URL that was requested.
        url: String,
        /// First byte that was requested.
        start: u64,
        /// Last byte that was requested (inclusive).
        end: u64,
    },

    /// A segment could not be fully written.
    #[error(
        "segment {index} incomplete: got {written} of {expected} bytes ({} missing)",
        .expected - .written
    )]
    SegmentIncomplete {
        /// Index of the failed segment.
        index: usize,
        /// Bytes of the segment that were written.
        written: u64,
        /// Total length of the segment.
        expected: u64,
        /// The last error observed before giving up, if any.
        #[source]
        source: Option<Box<DownloadError>>,
    },
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error to `Timeout` or `Network`.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// A body that ended before its declared length.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a protocol violation error.
    pub fn protocol(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates a resource-changed error for the requested byte range.
    pub fn resource_changed(url: impl Into<String>, start: u64, end: u64) -> Self {
        Self::ResourceChanged {
            url: url.into(),
            start,
            end,
        }
    }

    /// Creates a segment-incomplete error, keeping the last failure as its source.
    pub fn segment_incomplete(
        index: usize,
        written: u64,
        expected: u64,
        source: Option<DownloadError>,
    ) -> Self {
        Self::SegmentIncomplete {
            index,
            written,
            expected,
            source: source.map(Box::new),
        }
    }
}
