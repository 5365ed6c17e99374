//! Segment fetching: one byte range written in place at its absolute offset.
//!
//! Each segment keeps a cursor that starts at the segment's first byte and only
//! moves forward. A dropped connection is retried from the cursor, never from
//! the segment start, so progress is never counted twice. Retry bookkeeping is
//! an explicit state machine ([`SegmentState`]) in which any attempt that
//! delivered at least one byte resets the failure count and the backoff.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_RANGE, HeaderMap};
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use super::plan::Segment;
use super::progress::Progress;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};

/// Regex for `Content-Range: bytes <start>-<end>/<total or *>`.
#[allow(clippy::expect_used)]
static CONTENT_RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^bytes\s+(\d+)-(\d+)/(\d+|\*)$").expect("Content-Range regex is valid") // Static pattern, safe to panic
});

/// Parsed `Content-Range` of a `206` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` for `*`.
    pub total: Option<u64>,
}

/// Parses the `Content-Range` header, if present and well-formed.
pub(crate) fn parse_content_range(headers: &HeaderMap) -> Option<ContentRange> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let caps = CONTENT_RANGE_PATTERN.captures(value.trim())?;
    let start = caps.get(1)?.as_str().parse().ok()?;
    let end = caps.get(2)?.as_str().parse().ok()?;
    let total = match caps.get(3)?.as_str() {
        "*" => None,
        digits => Some(digits.parse().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// How to handle one response to a segment request.
#[derive(Debug)]
pub(crate) enum ResponsePlan {
    /// Write the body starting at this absolute offset.
    Write { from: u64 },
    /// The server says the range is already satisfied.
    AlreadyComplete,
    /// Do not touch the file.
    Fail(DownloadError),
}

/// Decides what a response to `Range: bytes=<cursor>-<end>` means.
///
/// - `206` is checked against its `Content-Range`: it may start later than the
///   cursor (the cursor skips forward) but not earlier, not past `end`, and
///   must declare the probed total.
/// - `200` means the range or the `If-Range` validator was ignored.
/// - `416` is accepted as "already complete" only when re-requesting.
pub(crate) fn classify_response(
    url: &str,
    status: StatusCode,
    content_range: Option<ContentRange>,
    cursor: u64,
    end: u64,
    re_request: bool,
    expected_total: u64,
) -> ResponsePlan {
    match status {
        StatusCode::PARTIAL_CONTENT => {
            let Some(range) = content_range else {
                return ResponsePlan::Fail(DownloadError::protocol(
                    url,
                    "206 response without a valid Content-Range",
                ));
            };
            if let Some(total) = range.total
                && total != expected_total
            {
                return ResponsePlan::Fail(DownloadError::protocol(
                    url,
                    format!("Content-Range total {total} differs from probed size {expected_total}"),
                ));
            }
            if range.start < cursor {
                return ResponsePlan::Fail(DownloadError::protocol(
                    url,
                    format!("Content-Range starts at {} before requested {cursor}", range.start),
                ));
            }
            if range.start > end {
                return ResponsePlan::Fail(DownloadError::protocol(
                    url,
                    format!("Content-Range starts at {} past segment end {end}", range.start),
                ));
            }
            if range.start > cursor {
                warn!(cursor, server_start = range.start, "server skipped ahead, moving cursor");
            }
            ResponsePlan::Write { from: range.start }
        }
        StatusCode::OK => {
            ResponsePlan::Fail(DownloadError::resource_changed(url, cursor, end))
        }
        StatusCode::RANGE_NOT_SATISFIABLE if re_request => ResponsePlan::AlreadyComplete,
        StatusCode::RANGE_NOT_SATISFIABLE => ResponsePlan::Fail(DownloadError::protocol(
            url,
            format!("416 for bytes {cursor}-{end} on first request"),
        )),
        other => ResponsePlan::Fail(DownloadError::http_status(url, other.as_u16())),
    }
}

/// Lifecycle of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Not requested yet.
    Pending,
    /// A request is outstanding or its body is being written.
    InProgress,
    /// Waiting out a backoff delay before the next request.
    RetryWait {
        /// Consecutive failed attempts so far.
        failures: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Every byte of the segment is written and synced.
    Done,
    /// Retries exhausted or a permanent error occurred.
    Failed,
}

/// Per-segment retry state machine.
///
/// Transitions:
/// - `Pending | RetryWait | InProgress -> InProgress` on [`begin_attempt`](Self::begin_attempt)
/// - `InProgress -> InProgress` on [`record_progress`](Self::record_progress), clearing failures
/// - `InProgress -> RetryWait | Failed` on [`record_failure`](Self::record_failure)
/// - `InProgress -> Done` on [`finish`](Self::finish)
#[derive(Debug, Clone)]
pub struct SegmentMachine {
    state: SegmentState,
    failures: u32,
}

impl Default for SegmentMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentMachine {
    /// A machine in [`SegmentState::Pending`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SegmentState::Pending,
            failures: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Consecutive failures since the last forward progress.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Starts a request.
    pub fn begin_attempt(&mut self) {
        debug_assert!(matches!(
            self.state,
            SegmentState::Pending | SegmentState::RetryWait { .. } | SegmentState::InProgress
        ));
        self.state = SegmentState::InProgress;
    }

    /// Forward progress was made: the next failure starts from the base delay.
    pub fn record_progress(&mut self) {
        self.failures = 0;
    }

    /// Records a failed attempt and decides between waiting and giving up.
    pub fn record_failure(&mut self, failure: FailureType, policy: &RetryPolicy) -> SegmentState {
        self.failures += 1;
        self.state = match policy.should_retry(failure, self.failures) {
            RetryDecision::Retry { delay, .. } => SegmentState::RetryWait {
                failures: self.failures,
                delay,
            },
            RetryDecision::DoNotRetry { reason } => {
                debug!(reason = %reason, "giving up on segment");
                SegmentState::Failed
            }
        };
        self.state
    }

    /// The segment is fully written.
    pub fn finish(&mut self) {
        self.state = SegmentState::Done;
    }
}

/// Everything a segment task needs besides its segment.
#[derive(Debug, Clone)]
pub struct SegmentContext {
    /// Shared HTTP client.
    pub client: HttpClient,
    /// Resource URL.
    pub url: Arc<str>,
    /// Pre-allocated output file.
    pub output: PathBuf,
    /// Probed total size, checked against every `Content-Range`.
    pub size: u64,
    /// Value for the `If-Range` header.
    pub if_range: Option<Arc<str>>,
    /// Backoff policy.
    pub retry: RetryPolicy,
    /// Shared byte counter.
    pub progress: Arc<Progress>,
}

/// Result of one request/response cycle.
enum Attempt {
    /// Response body ended; this many bytes were written.
    Streamed,
    /// `416` on a re-request.
    AlreadyComplete,
}

/// Downloads `segment` into the output file.
///
/// On success every byte in `[start, end]` is written at its own offset and
/// synced, and the progress counter has grown by exactly the segment length.
///
/// # Errors
///
/// Returns [`DownloadError::SegmentIncomplete`] naming the segment and the
/// missing byte count, with the last underlying error as its source, when
/// retries are exhausted or a permanent error occurs.
#[instrument(skip(ctx), fields(index = segment.index, start = segment.start, end = segment.end))]
pub async fn fetch_segment(ctx: &SegmentContext, segment: Segment) -> Result<(), DownloadError> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(&ctx.output)
        .await
        .map_err(|e| DownloadError::io(&ctx.output, e))?;

    let mut machine = SegmentMachine::new();
    let mut cursor = segment.start;
    let mut re_request = false;

    while cursor <= segment.end {
        machine.begin_attempt();
        let before = cursor;
        let outcome = attempt(ctx, &mut file, segment, &mut cursor, re_request).await;
        re_request = true;

        if cursor > before {
            machine.record_progress();
        }

        let error = match outcome {
            Ok(Attempt::AlreadyComplete) => {
                let remaining = segment.end + 1 - cursor;
                warn!(cursor, remaining, "server reports range satisfied, treating segment as complete");
                ctx.progress.add(remaining);
                break;
            }
            Ok(Attempt::Streamed) if cursor > segment.end => break,
            Ok(Attempt::Streamed) if cursor > before => {
                debug!(cursor, "response ended early, requesting remainder");
                continue;
            }
            // An empty body is a failed attempt, or an under-delivering
            // server would be re-requested forever.
            Ok(Attempt::Streamed) => DownloadError::integrity(
                &ctx.output,
                segment.end + 1 - cursor,
                0,
            ),
            Err(error) => error,
        };

        match machine.record_failure(classify_error(&error), &ctx.retry) {
            SegmentState::RetryWait { failures, delay } => {
                info!(
                    index = segment.index,
                    attempt = failures + 1,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "segment attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                let written = cursor - segment.start;
                warn!(
                    index = segment.index,
                    written,
                    expected = segment.len(),
                    error = %error,
                    "segment failed"
                );
                return Err(DownloadError::segment_incomplete(
                    segment.index,
                    written,
                    segment.len(),
                    Some(error),
                ));
            }
        }
    }

    machine.finish();
    debug!(index = segment.index, "segment complete");
    Ok(())
}

/// Issues one request for `[cursor, end]` and writes whatever arrives.
///
/// `cursor` is advanced past every byte written, even when the body stream
/// fails midway.
async fn attempt(
    ctx: &SegmentContext,
    file: &mut File,
    segment: Segment,
    cursor: &mut u64,
    re_request: bool,
) -> Result<Attempt, DownloadError> {
    let response = ctx
        .client
        .get_range(&ctx.url, *cursor, segment.end, ctx.if_range.as_deref())
        .await?;

    let plan = classify_response(
        &ctx.url,
        response.status(),
        parse_content_range(response.headers()),
        *cursor,
        segment.end,
        re_request,
        ctx.size,
    );

    match plan {
        ResponsePlan::Fail(error) => Err(error),
        ResponsePlan::AlreadyComplete => Ok(Attempt::AlreadyComplete),
        ResponsePlan::Write { from } => {
            // Skipped bytes still count toward the segment total.
            if from > *cursor {
                ctx.progress.add(from - *cursor);
                *cursor = from;
            }
            write_body(ctx, file, response, segment.end, cursor).await?;
            Ok(Attempt::Streamed)
        }
    }
}

async fn write_body(
    ctx: &SegmentContext,
    file: &mut File,
    response: Response,
    end: u64,
    cursor: &mut u64,
) -> Result<(), DownloadError> {
    let io_err = |e| DownloadError::io(&ctx.output, e);

    file.seek(std::io::SeekFrom::Start(*cursor))
        .await
        .map_err(io_err)?;

    let mut stream = response.bytes_stream();
    let mut result = Ok(());
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                result = Err(DownloadError::from_reqwest(ctx.url.as_ref(), e));
                break;
            }
        };

        let room = end + 1 - *cursor;
        let take = usize::try_from(room).map_or(chunk.len(), |room| room.min(chunk.len()));
        if let Err(e) = file.write_all(&chunk[..take]).await {
            result = Err(io_err(e));
            break;
        }
        *cursor += take as u64;
        ctx.progress.add(take as u64);
        ctx.progress.maybe_report();

        if take < chunk.len() {
            warn!(excess = chunk.len() - take, "server sent past segment end, truncating");
        }
        if *cursor > end {
            break;
        }
    }

    // Make what was written durable before the caller trusts the cursor.
    file.flush().await.map_err(io_err)?;
    file.sync_data().await.map_err(io_err)?;
    result
}
