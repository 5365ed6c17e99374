//! Resume side-file: which segments of an output file are durably written.
//!
//! The record lives next to the output as `<output>.meta.json`. It is only
//! trusted when it describes the same URL, size, chunk size and resource
//! generation (entity tag or modification date) as the current probe.
//!
//! Completions are funneled through [`ResumeStore`], which owns the in-memory
//! record behind a mutex and rewrites the file on every update, so two
//! segments finishing together cannot drop each other's entry.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::config::DownloadTarget;
use super::constants::RESUME_SUFFIX;
use super::error::DownloadError;
use super::plan::segment_count;
use super::probe::Validators;

/// Persisted resume record.
///
/// Every field is optional on read: a missing field never matches, which
/// forces a fresh start. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMetadata {
    /// URL the segments were fetched from.
    #[serde(default)]
    pub url: Option<String>,
    /// Total size the plan was made for.
    #[serde(default)]
    pub size: Option<u64>,
    /// Segment width the plan was made with.
    #[serde(default)]
    pub chunk_size: Option<u64>,
    /// Entity tag at the time of the first completion.
    #[serde(default)]
    pub etag: Option<String>,
    /// Last-Modified at the time of the first completion.
    #[serde(default)]
    pub last_modified: Option<String>,
    /// Indices of fully written segments.
    #[serde(default)]
    pub done: BTreeSet<usize>,
}

impl ResumeMetadata {
    /// Creates a record for `target` with the given completed set.
    #[must_use]
    pub fn new(target: &DownloadTarget, validators: &Validators, done: BTreeSet<usize>) -> Self {
        Self {
            url: Some(target.url.clone()),
            size: Some(target.size),
            chunk_size: Some(target.chunk_size),
            etag: validators.etag.clone(),
            last_modified: validators.last_modified.clone(),
            done,
        }
    }

    fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }
}

/// Path of the side-file for `output`.
#[must_use]
pub fn resume_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(RESUME_SUFFIX);
    PathBuf::from(name)
}

fn temp_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(resume_path(output).as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Loads the side-file for `output`.
///
/// A missing, unreadable or corrupt file reads as `None`.
pub async fn load(output: &Path) -> Option<ResumeMetadata> {
    let path = resume_path(output);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "unreadable resume file, starting fresh");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(meta) => Some(meta),
        Err(error) => {
            warn!(path = %path.display(), error = %error, "corrupt resume file, starting fresh");
            None
        }
    }
}

/// Writes the side-file for `output` through a temporary file and a rename.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] when the temporary file cannot be written or
/// renamed into place.
pub async fn save(output: &Path, meta: &ResumeMetadata) -> Result<(), DownloadError> {
    let path = resume_path(output);
    let tmp = temp_path(output);
    let json = serde_json::to_vec(meta).map_err(|e| DownloadError::io(&path, e.into()))?;

    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| DownloadError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| DownloadError::io(&path, e))
}

/// Deletes the side-file for `output`; a missing file is not an error.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] for any other removal failure.
pub async fn remove(output: &Path) -> Result<(), DownloadError> {
    let path = resume_path(output);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed resume file");
            Ok(())
        }
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(DownloadError::io(path, error)),
    }
}

/// Decides which recorded segments can be skipped for `target`.
///
/// Returns an empty set unless URL, size and chunk size are equal and the
/// validators agree (see [`Validators::matches`]). When neither side has any
/// validator the record is accepted on URL and size alone. Indices outside
/// the current plan are dropped.
#[must_use]
pub fn trust(
    meta: &ResumeMetadata,
    target: &DownloadTarget,
    validators: &Validators,
) -> BTreeSet<usize> {
    if meta.url.as_deref() != Some(target.url.as_str()) {
        info!("resume file is for another URL, starting fresh");
        return BTreeSet::new();
    }
    if meta.size != Some(target.size) {
        info!(stored = ?meta.size, probed = target.size, "size changed, starting fresh");
        return BTreeSet::new();
    }
    if meta.chunk_size != Some(target.chunk_size) {
        info!(stored = ?meta.chunk_size, configured = target.chunk_size, "chunk size changed, starting fresh");
        return BTreeSet::new();
    }

    let stored = meta.validators();
    if stored.is_empty() && validators.is_empty() {
        warn!(
            url = %target.url,
            "server sends no ETag or Last-Modified; resuming on URL and size only"
        );
    } else if !stored.matches(validators) {
        info!(
            stored_etag = ?stored.etag,
            etag = ?validators.etag,
            "resource changed since last run, starting fresh"
        );
        return BTreeSet::new();
    }

    let count = segment_count(target.size, target.chunk_size);
    meta.done.iter().copied().filter(|&index| index < count).collect()
}

/// Loads and vets the side-file for `target`.
///
/// Prior progress is only honored when the output file still exists with the
/// probed length. A record that is rejected is deleted, so a crash before the
/// first new completion cannot resurrect it.
#[instrument(skip_all, fields(output = %target.output.display()))]
pub async fn load_trusted(target: &DownloadTarget, validators: &Validators) -> BTreeSet<usize> {
    let Some(meta) = load(&target.output).await else {
        return BTreeSet::new();
    };

    let file_len = tokio::fs::metadata(&target.output)
        .await
        .ok()
        .map(|m| m.len());
    let done = if file_len == Some(target.size) {
        trust(&meta, target, validators)
    } else {
        info!(file_len = ?file_len, "output file missing or resized, starting fresh");
        BTreeSet::new()
    };

    if done.is_empty() {
        if let Err(error) = remove(&target.output).await {
            warn!(error = %error, "failed to remove stale resume file");
        }
    } else {
        info!(segments = done.len(), "resuming previously completed segments");
    }
    done
}

/// Single owner of the resume record during a segmented download.
#[derive(Debug)]
pub struct ResumeStore {
    output: PathBuf,
    state: Mutex<ResumeMetadata>,
}

impl ResumeStore {
    /// Creates the owner, seeded with already trusted segments.
    #[must_use]
    pub fn new(target: &DownloadTarget, validators: &Validators, done: BTreeSet<usize>) -> Self {
        Self {
            output: target.output.clone(),
            state: Mutex::new(ResumeMetadata::new(target, validators, done)),
        }
    }

    /// Records `index` as complete and persists the record.
    ///
    /// The lock is held across the write so updates reach the file in order.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the side-file cannot be written.
    pub async fn mark_complete(&self, index: usize) -> Result<(), DownloadError> {
        let mut state = self.state.lock().await;
        state.done.insert(index);
        save(&self.output, &state).await
    }

    /// Deletes the side-file.
    ///
    /// # Errors
    ///
    /// See [`remove`].
    pub async fn remove(&self) -> Result<(), DownloadError> {
        let _state = self.state.lock().await;
        remove(&self.output).await
    }
}
