//! Configuration for topic discovery and conversion.
//!
//! All library behaviour is controlled through [`StudyConfig`], built via
//! [`StudyConfigBuilder`]. Callers set only what they care about and rely on
//! the defaults for the rest.

use crate::error::StudyHtmlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default decompressed size limit for a single DOCX part (zip-bomb guard).
pub const DEFAULT_MAX_PART_BYTES: u64 = 50 * 1024 * 1024;

/// Configuration for discovery and conversion.
///
/// # Example
/// ```rust
/// use studyhtml::StudyConfig;
///
/// let config = StudyConfig::builder()
///     .topics_root("uploads/topics")
///     .persist_converted(false)
///     .build()
///     .unwrap();
/// assert!(!config.persist_converted);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Root of the `<category>/<topic>/` tree. Default: `uploads/topics`.
    pub topics_root: PathBuf,

    /// Write converted HTML next to its source so later requests skip the
    /// conversion. Default: true.
    pub persist_converted: bool,

    /// Maximum decompressed bytes read from one DOCX part. Default: 50 MiB.
    pub max_part_bytes: u64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            topics_root: PathBuf::from("uploads").join("topics"),
            persist_converted: true,
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
        }
    }
}

impl StudyConfig {
    /// Create a new builder for `StudyConfig`.
    pub fn builder() -> StudyConfigBuilder {
        StudyConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`StudyConfig`].
#[derive(Debug)]
pub struct StudyConfigBuilder {
    config: StudyConfig,
}

impl StudyConfigBuilder {
    pub fn topics_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.topics_root = root.as_ref().to_path_buf();
        self
    }

    pub fn persist_converted(mut self, v: bool) -> Self {
        self.config.persist_converted = v;
        self
    }

    pub fn max_part_bytes(mut self, n: u64) -> Self {
        self.config.max_part_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StudyConfig, StudyHtmlError> {
        let c = &self.config;
        if c.topics_root.as_os_str().is_empty() {
            return Err(StudyHtmlError::InvalidConfig(
                "topics_root must not be empty".into(),
            ));
        }
        if c.max_part_bytes < 1024 {
            return Err(StudyHtmlError::InvalidConfig(format!(
                "max_part_bytes must be ≥ 1024, got {}",
                c.max_part_bytes
            )));
        }
        Ok(self.config)
    }
}
