//! # studyhtml
//!
//! Normalise study documents (word-processor files, flat PDF text extracts)
//! into one semantic HTML representation.
//!
//! ## Why heuristics?
//!
//! Flat PDF text has no document model left: headings, lists and tables are
//! just lines. The flat-text path recovers structure line by line with a
//! small classifier. DOCX files do carry styles, so the structured path maps
//! named paragraph styles to heading tags instead of guessing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! topic folder
//!  │
//!  ├─ 1. Discover  scan <root>/<category>/<topic>/ for .html/.docx/.pdf/.txt
//!  ├─ 2. Pick      existing HTML > structured document > flat-text extract
//!  ├─ 3. Convert   docx: styles → tags, lists, tables, references last
//!  │               pdf/txt: classify lines → headings/lists/tables/paragraphs
//!  └─ 4. Persist   write <source>.html so the next request skips step 3
//! ```
//!
//! Offline audio caching lives in the companion `offline-cache` crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studyhtml::{Converter, StudyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StudyConfig::builder().topics_root("uploads/topics").build()?;
//!     let converter = Converter::new(config);
//!     let rendered = converter.render_id("pathology/renal-tumours").await?;
//!     println!("{}", rendered.html);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `study2html` binary (clap + anyhow + tracing-subscriber) |
//!
//! ```toml
//! studyhtml = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod topics;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{StudyConfig, StudyConfigBuilder};
pub use convert::{convert_document, convert_file, html_target, Converter, TopicSources};
pub use error::{DocumentError, StudyHtmlError};
pub use output::{ContentOrigin, RenderedContent};
pub use pipeline::classify::{classify_line, ClassifiedLine, LineRole};
pub use pipeline::flat::{flat_text_to_html, lines_to_html, FlatHtmlBuilder};
pub use pipeline::input::{SourceDocument, SourceFormat};
pub use pipeline::references::relocate_references;
pub use pipeline::structured::docx_to_html;
pub use topics::{discover_topics, load_topic, Topic, TopicFiles};
