//! Capability probing: total size, range support and cache validators.

use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderMap, LAST_MODIFIED};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::client::{HttpClient, declared_length, header_string, parse_http_url};
use super::error::DownloadError;
use super::segment::parse_content_range;

/// Server-supplied tokens identifying one generation of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    /// `ETag` header, quotes and `W/` prefix included.
    pub etag: Option<String>,
    /// `Last-Modified` header, verbatim.
    pub last_modified: Option<String>,
}

impl Validators {
    /// Captures `ETag` and `Last-Modified` from response headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            etag: header_string(headers, ETAG),
            last_modified: header_string(headers, LAST_MODIFIED),
        }
    }

    /// True when neither validator is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// True when both sides describe the same representation.
    ///
    /// Entity tags decide when both sides have one. Otherwise Last-Modified
    /// must be present on both sides and equal.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (&self.etag, &other.etag) {
            (Some(a), Some(b)) => a == b,
            _ => matches!(
                (&self.last_modified, &other.last_modified),
                (Some(a), Some(b)) if a == b
            ),
        }
    }

    /// Value for an `If-Range` header.
    ///
    /// Weak entity tags are not allowed in `If-Range`, so a weak tag falls back
    /// to the modification date.
    #[must_use]
    pub fn if_range(&self) -> Option<&str> {
        match self.etag.as_deref() {
            Some(tag) if !tag.starts_with("W/") => Some(tag),
            _ => self.last_modified.as_deref(),
        }
    }

    fn fill_missing(&mut self, headers: &HeaderMap) {
        if self.is_empty() {
            *self = Self::from_headers(headers);
        }
    }
}

/// What the server told us about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Total size in bytes, when any response declared it.
    pub size: Option<u64>,
    /// Whether a one-byte range request came back as `206`.
    pub supports_ranges: bool,
    /// Validators captured from the first response that carried any.
    pub validators: Validators,
}

/// Probes `url` for size, range support and validators.
///
/// Order of requests:
/// 1. `HEAD` for size and validators (any failure is ignored)
/// 2. `GET` with `Range: bytes=0-0`: `206` proves range support, anything else
///    (including a transport error) means no range support. The total in its
///    `Content-Range` replaces the `HEAD` length.
/// 3. a plain `GET` whose headers are read and whose body is dropped, only
///    when the size is still unknown
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] for non-HTTP URLs, and the error of
/// the final `GET` when it was needed and failed.
#[instrument(skip(client))]
pub async fn probe(client: &HttpClient, url: &str) -> Result<Capabilities, DownloadError> {
    parse_http_url(url)?;

    let mut caps = Capabilities::default();

    match client.head(url).await {
        Ok(response) if response.status().is_success() => {
            caps.size = declared_length(response.headers());
            caps.validators = Validators::from_headers(response.headers());
        }
        Ok(response) => debug!(status = response.status().as_u16(), "HEAD rejected"),
        Err(error) => debug!(error = %error, "HEAD failed"),
    }

    match client.get_range(url, 0, 0, None).await {
        Ok(response) if response.status() == StatusCode::PARTIAL_CONTENT => {
            caps.supports_ranges = true;
            // Segment responses are checked against this total.
            if let Some(total) =
                parse_content_range(response.headers()).and_then(|range| range.total)
            {
                if let Some(head) = caps.size
                    && head != total
                {
                    warn!(head, total, "HEAD length disagrees with Content-Range total");
                }
                caps.size = Some(total);
            }
            caps.validators.fill_missing(response.headers());
        }
        Ok(response) => {
            debug!(
                status = response.status().as_u16(),
                "range probe not honored"
            );
        }
        Err(error) => debug!(error = %error, "range probe failed"),
    }

    if caps.size.is_none() {
        let response = client.get(url).await?;
        caps.size = declared_length(response.headers());
        caps.validators.fill_missing(response.headers());
        // Dropping the response aborts the body transfer.
    }

    info!(
        size = ?caps.size,
        supports_ranges = caps.supports_ranges,
        etag = ?caps.validators.etag,
        last_modified = ?caps.validators.last_modified,
        "probe complete"
    );
    Ok(caps)
}
