//! Error types for the studyhtml library.
//!
//! Two error types reflect two layers:
//!
//! * [`StudyHtmlError`]: what a caller of the conversion orchestrator or
//!   topic lookup sees. `ContentAbsent` ("nothing to show yet") and
//!   `ConversionFailed` ("there was a source but it would not convert") are
//!   separate variants so a viewer can render two different states.
//!
//! * [`DocumentError`]: why a single source document could not be turned
//!   into HTML (bad zip, malformed XML, unreadable PDF text layer). It is
//!   wrapped into `ConversionFailed` by the orchestrator.
//!
//! Line classification and flat-text HTML building never fail; they have no
//! error type.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the studyhtml library.
#[derive(Debug, Error)]
pub enum StudyHtmlError {
    // ── Content errors ────────────────────────────────────────────────────
    /// The topic has no HTML, structured-document or flat-text source.
    #[error("No content available for topic '{topic}' yet")]
    ContentAbsent { topic: String },

    /// A source exists but converting it failed. Nothing was written.
    #[error("Conversion of '{path}' failed: {source}")]
    ConversionFailed {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    // ── Topic errors ──────────────────────────────────────────────────────
    /// The topic id is not of the form `category/slug`, or tries to escape
    /// the topics root.
    #[error("Invalid topic id '{id}': {reason}")]
    InvalidTopicId { id: String, reason: String },

    /// The topic id is well-formed but no such directory exists.
    #[error("Topic not found: '{id}'")]
    TopicNotFound { id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading a source document failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisting the converted HTML failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scanning the topics tree failed.
    #[error("Failed to scan '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudyHtmlError {
    /// `true` for the "not yet available" state (not a failure).
    pub fn is_content_absent(&self) -> bool {
        matches!(self, StudyHtmlError::ContentAbsent { .. })
    }

    /// `true` when a source existed but could not be converted.
    pub fn is_conversion_failure(&self) -> bool {
        matches!(self, StudyHtmlError::ConversionFailed { .. })
    }
}

/// Why a single source document could not be converted.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The structured document is not a readable zip container.
    #[error("not a valid DOCX container: {0}")]
    NotAZip(String),

    /// A required part (e.g. `word/document.xml`) is missing.
    #[error("missing part '{0}'")]
    MissingPart(String),

    /// A part exceeds the decompressed size limit.
    #[error("part '{name}' exceeds size limit ({limit} bytes)")]
    EntryTooLarge { name: String, limit: u64 },

    /// XML inside a part is malformed.
    #[error("malformed XML in '{part}': {detail}")]
    Xml { part: String, detail: String },

    /// The PDF text layer could not be extracted.
    #[error("PDF text extraction failed: {0}")]
    PdfExtract(String),

    /// The source is already HTML and was handed to a converter.
    #[error("source format '{0}' cannot be converted")]
    Unsupported(String),
}
