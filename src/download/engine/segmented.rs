//! Segmented transfer: plan, resume, pre-allocate, fetch under a semaphore.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::OpenOptions;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use super::{DownloadEngine, EngineError};
use crate::download::config::DownloadTarget;
use crate::download::error::DownloadError;
use crate::download::plan::{Segment, plan_segments};
use crate::download::probe::Validators;
use crate::download::progress::Progress;
use crate::download::resume::{self, ResumeStore};
use crate::download::segment::{SegmentContext, fetch_segment};

/// Segment counts of a finished segmented run.
#[derive(Debug, Clone, Copy)]
pub(super) struct SegmentedReport {
    pub resumed: usize,
    pub fetched: usize,
}

#[instrument(skip_all, fields(url = %target.url, size = target.size))]
pub(super) async fn run(
    engine: &DownloadEngine,
    target: &DownloadTarget,
    validators: &Validators,
) -> Result<SegmentedReport, EngineError> {
    let segments = plan_segments(target.size, target.chunk_size)?;
    let done = resume::load_trusted(target, validators).await;
    preallocate(target).await?;

    let progress = Arc::new(Progress::new(
        Some(target.size),
        engine.config.progress_interval,
        Arc::clone(&engine.observer),
    ));
    progress.add(completed_bytes(&segments, &done));

    let pending: Vec<Segment> = segments
        .iter()
        .copied()
        .filter(|segment| !done.contains(&segment.index))
        .collect();
    info!(
        segments = segments.len(),
        resumed = done.len(),
        pending = pending.len(),
        "starting segmented download"
    );

    let report = SegmentedReport {
        resumed: done.len(),
        fetched: pending.len(),
    };
    let store = Arc::new(ResumeStore::new(target, validators, done));
    let ctx = SegmentContext {
        client: engine.client.clone(),
        url: Arc::from(target.url.as_str()),
        output: target.output.clone(),
        size: target.size,
        if_range: validators.if_range().map(Arc::from),
        retry: engine.config.retry.clone(),
        progress: Arc::clone(&progress),
    };

    fetch_all(engine.config.concurrency, &ctx, &store, pending).await?;

    progress.finish();
    if let Err(error) = store.remove().await {
        warn!(error = %error, "failed to remove resume file after completion");
    }
    info!(bytes = target.size, "segmented download complete");
    Ok(report)
}

/// Runs one task per pending segment with at most `concurrency` in flight.
///
/// The first fatal error stops new segments from starting; tasks already
/// running finish and persist their completion. That first error is returned.
async fn fetch_all(
    concurrency: usize,
    ctx: &SegmentContext,
    store: &Arc<ResumeStore>,
    pending: Vec<Segment>,
) -> Result<(), EngineError> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let failed = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<DownloadError>>> = Arc::new(Mutex::new(None));
    let mut handles = Vec::with_capacity(pending.len());

    for segment in pending {
        // Acquire semaphore permit (blocks if at concurrency limit)
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::SemaphoreClosed)?;

        if failed.load(Ordering::Acquire) {
            debug!(index = segment.index, "not starting segment after failure");
            break;
        }

        let ctx = ctx.clone();
        let store = Arc::clone(store);
        let failed = Arc::clone(&failed);
        let first_error = Arc::clone(&first_error);

        handles.push(tokio::spawn(async move {
            // Permit is dropped when this block exits (RAII)
            let _permit = permit;

            match fetch_segment(&ctx, segment).await {
                Ok(()) => {
                    if let Err(error) = store.mark_complete(segment.index).await {
                        warn!(index = segment.index, error = %error, "failed to persist segment completion");
                    }
                }
                Err(error) => {
                    failed.store(true, Ordering::Release);
                    let mut slot = first_error.lock().await;
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                }
            }
        }));
    }

    debug!(task_count = handles.len(), "waiting for segments to complete");

    let mut join_error = None;
    for handle in handles {
        if let Err(error) = handle.await {
            warn!(error = %error, "segment task panicked");
            join_error.get_or_insert(error);
        }
    }

    if let Some(error) = first_error.lock().await.take() {
        return Err(EngineError::Download(error));
    }
    if let Some(error) = join_error {
        return Err(EngineError::Join(error));
    }
    Ok(())
}

/// Creates the output file at full size, or fixes the size of an existing one.
///
/// Existing bytes are kept: they back the segments trusted from a previous run.
async fn preallocate(target: &DownloadTarget) -> Result<(), DownloadError> {
    let io_err = |e| DownloadError::io(&target.output, e);

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&target.output)
        .await
        .map_err(io_err)?;
    let len = file.metadata().await.map_err(io_err)?.len();
    if len != target.size {
        debug!(from = len, to = target.size, "setting output file length");
        file.set_len(target.size).await.map_err(io_err)?;
    }
    Ok(())
}

fn completed_bytes(segments: &[Segment], done: &BTreeSet<usize>) -> u64 {
    done.iter()
        .filter_map(|&index| segments.get(index))
        .map(Segment::len)
        .sum()
}
