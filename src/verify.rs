//! SHA-256 verification of a finished output file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

const READ_BUFFER_SIZE: usize = 1 << 20;

/// Errors from [`verify_sha256`].
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being hashed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The digest differs from the expected one.
    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        /// File being verified.
        path: PathBuf,
        /// Digest supplied by the user.
        expected: String,
        /// Digest of the file (lowercase hex).
        actual: String,
    },
}

/// Computes the lowercase hex SHA-256 of the file at `path`.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] if the file cannot be opened or read.
#[instrument]
pub async fn sha256_file(path: &Path) -> Result<String, VerifyError> {
    let io_err = |source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buffer).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    debug!(digest = %hex, "computed sha256");
    Ok(hex)
}

/// Checks the file's SHA-256 against `expected`, ignoring case and surrounding
/// whitespace.
///
/// # Errors
///
/// Returns [`VerifyError::Mismatch`] with both digests when they differ, or
/// [`VerifyError::Io`] when the file cannot be read.
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<(), VerifyError> {
    let actual = sha256_file(path).await?;
    let expected = expected.trim();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        })
    }
}
