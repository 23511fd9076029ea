//! Configuration for the offline cache.
//!
//! Everything the store needs to know about where it lives is in
//! [`CacheConfig`]. The `store_id` scopes both the metadata namespace and the
//! blob namespace, so [`crate::OfflineCache::clear_all`] can wipe the cache
//! wholesale without touching anything else under `root`.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default store identifier (one directory under the cache root).
pub const DEFAULT_STORE_ID: &str = "study-audio-cache";

/// Configuration for an [`crate::OfflineCache`].
///
/// # Example
/// ```rust
/// use offline_cache::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .root("/var/cache/study")
///     .store_id("audio-v1")
///     .fetch_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert!(config.store_dir().ends_with("audio-v1"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory under which the store directory is created. Default: `.cache`.
    pub root: PathBuf,

    /// Name of the store directory below `root`. Default: [`DEFAULT_STORE_ID`].
    pub store_id: String,

    /// Timeout for the remote fetch performed by `save`. Default: 120.
    pub fetch_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".cache"),
            store_id: DEFAULT_STORE_ID.to_string(),
            fetch_timeout_secs: 120,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for `CacheConfig`.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder {
            config: Self::default(),
        }
    }

    /// `<root>/<store_id>`: the only directory the store ever writes to.
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(&self.store_id)
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.root = root.as_ref().to_path_buf();
        self
    }

    pub fn store_id(mut self, id: impl Into<String>) -> Self {
        self.config.store_id = id.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CacheConfig> {
        let id = &self.config.store_id;
        if id.is_empty() {
            return Err(CacheError::InvalidConfig("store_id must not be empty".into()));
        }
        if id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(CacheError::InvalidConfig(format!(
                "store_id must be a single directory name, got '{id}'"
            )));
        }
        Ok(self.config)
    }
}
