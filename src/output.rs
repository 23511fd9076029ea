//! Output types for rendered topic content.

use crate::pipeline::input::SourceFormat;
use serde::Serialize;
use std::path::PathBuf;

/// Where the returned HTML came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContentOrigin {
    /// An `.html` file already on disk (authored, or persisted earlier).
    Existing,
    /// Converted during this request.
    Converted { format: SourceFormat },
}

/// HTML for one topic plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedContent {
    pub html: String,
    /// The `.html` path served or written. `None` when the conversion was
    /// not persisted.
    pub path: Option<PathBuf>,
    pub origin: ContentOrigin,
    pub duration_ms: u64,
}

impl RenderedContent {
    /// `true` if a conversion ran for this request.
    pub fn was_converted(&self) -> bool {
        matches!(self.origin, ContentOrigin::Converted { .. })
    }
}
