//! Single-stream fallback: one GET from byte zero, retried as a whole.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::DownloadEngine;
use crate::download::client::declared_length;
use crate::download::error::DownloadError;
use crate::download::progress::Progress;
use crate::download::resume;
use crate::download::retry::{RetryDecision, classify_error};

/// Downloads `url` into `output` sequentially and returns the byte count.
///
/// Every retry truncates the file and starts over. A stale segmented side-file
/// for the same output is removed on success.
#[instrument(skip(engine, output), fields(output = %output.display()))]
pub(super) async fn run(
    engine: &DownloadEngine,
    url: &str,
    output: &Path,
) -> Result<u64, DownloadError> {
    let policy = &engine.config.retry;
    let mut failures = 0u32;

    loop {
        match fetch_once(engine, url, output).await {
            Ok(bytes) => {
                if let Err(error) = resume::remove(output).await {
                    warn!(error = %error, "failed to remove stale resume file");
                }
                info!(bytes, "single-stream download complete");
                return Ok(bytes);
            }
            Err(error) => {
                failures += 1;
                match policy.should_retry(classify_error(&error), failures) {
                    RetryDecision::Retry { delay, attempt } => {
                        info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying download"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(%reason, "not retrying download");
                        return Err(error);
                    }
                }
            }
        }
    }
}

async fn fetch_once(engine: &DownloadEngine, url: &str, output: &Path) -> Result<u64, DownloadError> {
    let response = engine.client.get(url).await?;
    let expected = declared_length(response.headers());
    let progress = Progress::new(
        expected,
        engine.config.progress_interval,
        Arc::clone(&engine.observer),
    );

    let io_err = |e| DownloadError::io(output, e);
    let file = File::create(output).await.map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::from_reqwest(url, e))?;
        writer.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
        progress.add(chunk.len() as u64);
        progress.maybe_report();
    }

    writer.flush().await.map_err(io_err)?;
    writer.get_ref().sync_data().await.map_err(io_err)?;

    if let Some(expected) = expected
        && expected != written
    {
        return Err(DownloadError::integrity(output, expected, written));
    }

    progress.finish();
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::download::config::DownloadConfig;
    use crate::download::retry::RetryPolicy;

    fn engine(max_retries: u32) -> DownloadEngine {
        let retry = RetryPolicy::new(
            max_retries,
            Duration::from_millis(10),
            Duration::from_millis(50),
            2.0,
        );
        DownloadEngine::new(DownloadConfig::default().with_retry(retry)).unwrap()
    }

    #[tokio::test]
    async fn test_single_stream_retries_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.txt");
        let bytes = run(&engine(2), &format!("{}/f", server.uri()), &output)
            .await
            .unwrap();

        assert_eq!(bytes, 11);
        assert_eq!(std::fs::read(&output).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_single_stream_does_not_retry_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = run(&engine(5), &format!("{}/f", server.uri()), &dir.path().join("x")).await;
        assert!(matches!(result, Err(DownloadError::HttpStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_single_stream_removes_stale_resume_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![5u8; 64]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        std::fs::write(resume::resume_path(&output), b"{}").unwrap();
        std::fs::write(&output, vec![0u8; 1000]).unwrap();

        run(&engine(0), &format!("{}/f", server.uri()), &output)
            .await
            .unwrap();

        assert!(!resume::resume_path(&output).exists());
        assert_eq!(std::fs::read(&output).unwrap(), vec![5u8; 64]);
    }
}
