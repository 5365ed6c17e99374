//! HTTP client wrapper for probing and ranged fetching.
//!
//! This module provides the `HttpClient` struct which issues the HEAD, ranged
//! GET and plain GET requests the engine needs, with timeout configuration and
//! error mapping shared by every caller.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, HeaderMap, IF_RANGE, RANGE};
use reqwest::{Client, Response};
use tracing::{debug, instrument};
use url::Url;

use super::config::DownloadConfig;
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client shared by every request of a download.
///
/// Cheap to clone: clones share one connection pool, so segment tasks each take
/// their own handle.
///
/// # Example
///
/// ```no_run
/// use fastget_core::download::{DownloadConfig, HttpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(&DownloadConfig::default())?;
/// let response = client.get_range("https://example.com/file.iso", 0, 1023, None).await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the timeouts from `config`.
    ///
    /// Transparent decompression stays off: ranges address the encoded bytes
    /// on the wire, so every offset must match what the server sent.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be set up.
    pub fn new(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeouts(config.connect_timeout, config.read_timeout)
    }

    /// Creates a client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be set up.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Sends a HEAD request. The status is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for non-HTTP URLs and
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] when the request
    /// cannot be completed.
    #[instrument(level = "debug", skip(self))]
    pub async fn head(&self, url: &str) -> Result<Response, DownloadError> {
        let parsed = parse_http_url(url)?;
        self.client
            .head(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))
    }

    /// Requests bytes `start..=end`, optionally conditioned on `If-Range`.
    ///
    /// The status is not checked: the caller decides what `200`, `206` and
    /// `416` mean for it.
    ///
    /// # Errors
    ///
    /// Same as [`head`](Self::head).
    #[instrument(level = "debug", skip(self))]
    pub async fn get_range(
        &self,
        url: &str,
        start: u64,
        end: u64,
        if_range: Option<&str>,
    ) -> Result<Response, DownloadError> {
        let parsed = parse_http_url(url)?;
        let mut request = self
            .client
            .get(parsed)
            .header(RANGE, format!("bytes={start}-{end}"));
        if let Some(validator) = if_range {
            request = request.header(IF_RANGE, validator);
        }
        request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))
    }

    /// Sends a plain GET and rejects non-success statuses.
    ///
    /// The body is left unread; dropping the response aborts it.
    ///
    /// # Errors
    ///
    /// Same as [`head`](Self::head), plus [`DownloadError::HttpStatus`] for
    /// 4xx/5xx responses.
    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, url: &str) -> Result<Response, DownloadError> {
        let parsed = parse_http_url(url)?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "GET rejected");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

/// Parses a URL and requires an `http` or `https` scheme.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] otherwise.
pub fn parse_http_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(DownloadError::invalid_url(url)),
    }
}

/// Reads `Content-Length` straight from the headers.
///
/// `Response::content_length` reports the size of the body actually sent,
/// which is zero for HEAD, so the header is parsed instead.
pub(crate) fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Returns a header value as an owned string when it is valid visible ASCII.
pub(crate) fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::{ETAG, HeaderValue};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(&DownloadConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_http_url_accepts_http_and_https() {
        assert!(parse_http_url("http://example.com/a").is_ok());
        assert!(parse_http_url("https://example.com/a").is_ok());
    }

    #[test]
    fn test_parse_http_url_rejects_other_schemes() {
        for url in ["ftp://example.com/a", "not a url", "file:///etc/passwd"] {
            assert!(
                matches!(parse_http_url(url), Err(DownloadError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_declared_length_parses_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1234"));
        assert_eq!(declared_length(&headers), Some(1234));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("abc"));
        assert_eq!(declared_length(&headers), None);
    }

    #[test]
    fn test_header_string_skips_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("  "));
        assert_eq!(header_string(&headers, ETAG), None);
        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        assert_eq!(header_string(&headers, ETAG).as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_get_range_sends_range_and_if_range_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .and(header("range", "bytes=10-19"))
            .and(header("if-range", "\"v1\""))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![7u8; 10]))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/file", server.uri());
        let response = client()
            .get_range(&url, 10, 19, Some("\"v1\""))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 206);
    }

    #[tokio::test]
    async fn test_get_sends_fastget_user_agent() {
        let server = MockServer::start().await;
        let expected = crate::user_agent::default_user_agent();
        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", expected.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/ua", server.uri());
        client().get(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        match client().get(&url).await {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
