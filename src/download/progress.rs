//! Progress tracking shared by all in-flight segments.
//!
//! [`Progress`] owns an atomic byte counter that every segment task adds to.
//! Reports are rate limited and handed to a [`ProgressObserver`]; the library
//! logs them through `tracing`, the binary draws a progress bar.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::units::format_bytes;

/// Point-in-time view of a download's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// Bytes written so far (including bytes from resumed segments).
    pub done: u64,
    /// Expected total, when known.
    pub total: Option<u64>,
    /// Time since tracking started.
    pub elapsed: Duration,
}

impl ProgressReport {
    /// Average rate in bytes per second since tracking started.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.done as f64 / secs
    }

    /// Remaining time at the current average rate.
    ///
    /// `None` when the total is unknown or nothing has been transferred yet.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let rate = self.throughput();
        if rate <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.done) as f64;
        Some(Duration::from_secs_f64((remaining / rate).max(0.0)))
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = format_bytes(self.throughput() as u64);
        match self.total {
            Some(total) => {
                let eta = self.eta().map_or(0, |eta| eta.as_secs());
                write!(
                    f,
                    "{} of {} - {rate}/s - ETA {eta}s",
                    format_bytes(self.done),
                    format_bytes(total)
                )
            }
            None => write!(f, "{} - {rate}/s", format_bytes(self.done)),
        }
    }
}

/// Receives rate-limited progress reports.
pub trait ProgressObserver: Send + Sync {
    /// Called at most once per reporting interval.
    fn on_progress(&self, report: &ProgressReport);

    /// Called once when the transfer finished successfully.
    fn on_finish(&self, report: &ProgressReport) {
        self.on_progress(report);
    }
}

/// Observer that writes reports to the `tracing` log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, report: &ProgressReport) {
        debug!(done = report.done, total = ?report.total, "{report}");
    }
}

/// Shared byte counter for one download invocation.
pub struct Progress {
    total: Option<u64>,
    done: AtomicU64,
    start: Instant,
    interval: Duration,
    /// Milliseconds since `start` of the last report, `u64::MAX` before the first.
    last_report_ms: AtomicU64,
    observer: Arc<dyn ProgressObserver>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("done", &self.done())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Starts tracking a transfer of `total` bytes.
    #[must_use]
    pub fn new(
        total: Option<u64>,
        interval: Duration,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            total,
            done: AtomicU64::new(0),
            start: Instant::now(),
            interval,
            last_report_ms: AtomicU64::new(u64::MAX),
            observer,
        }
    }

    /// Adds `n` transferred bytes, saturating at the total when it is known.
    pub fn add(&self, n: u64) {
        let cap = self.total.unwrap_or(u64::MAX);
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .done
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |done| {
                Some(done.saturating_add(n).min(cap))
            });
    }

    /// Bytes counted so far.
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }

    /// Current `{done, total, elapsed}`.
    #[must_use]
    pub fn snapshot(&self) -> ProgressReport {
        ProgressReport {
            done: self.done(),
            total: self.total,
            elapsed: self.start.elapsed(),
        }
    }

    /// Reports to the observer unless a report went out less than one interval ago.
    ///
    /// Concurrent callers race on a compare-and-swap; only the winner reports.
    pub fn maybe_report(&self) {
        let now_ms = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_report_ms.load(Ordering::Acquire);

        if last != u64::MAX && now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        if self
            .last_report_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.observer.on_progress(&self.snapshot());
    }

    /// Sends the final report.
    pub fn finish(&self) {
        self.observer.on_finish(&self.snapshot());
    }
}
