//! Error type for the offline cache.
//!
//! Only genuine failures become a [`CacheError`]. A metadata record whose
//! blob has gone missing is *not* one of them: the store treats it as a
//! cache miss, prunes the record and logs a warning, so callers of
//! [`crate::OfflineCache::is_cached`] never see it.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

/// All errors returned by the offline cache.
#[derive(Debug, Error)]
pub enum CacheError {
    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The remote audio could not be downloaded. Cache state is unchanged.
    #[error("Failed to fetch '{url}' for caching: {reason}")]
    FetchFailed { url: String, reason: String },

    /// The remote fetch exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Reading or writing a file under the store directory failed.
    #[error("Cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blob was written but reading it back gave a different length.
    #[error("Blob for '{url}' failed verification: wrote {expected} bytes, found {found}")]
    BlobVerifyFailed {
        url: String,
        expected: u64,
        found: u64,
    },

    /// A metadata record exists but is not valid JSON for a cache entry.
    #[error("Corrupt cache metadata '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// `true` when the error came from the remote fetch rather than local storage.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            CacheError::FetchFailed { .. } | CacheError::FetchTimeout { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
