//! Conversion orchestrator: pick a topic's best source, convert it at most
//! once, and persist the HTML next to the source.
//!
//! ## Source priority
//!
//! ```text
//! existing .html ──▶ serve as-is
//!        │ none
//! .docx ──────────▶ structured builder ─┐
//!        │ none                          ├──▶ write <source>.html ──▶ serve
//! .pdf / .txt ────▶ flat-text builder ──┘
//!        │ none
//!        ▼
//! ContentAbsent
//! ```
//!
//! The sibling `.html` file doubles as the conversion cache: once written,
//! later requests find it and skip conversion entirely. Concurrent requests
//! for the same cold target are serialised on a per-target lock; whoever
//! waits finds the file the first request wrote.

use crate::config::StudyConfig;
use crate::error::{DocumentError, StudyHtmlError};
use crate::output::{ContentOrigin, RenderedContent};
use crate::pipeline::input::{extract_flat_text, SourceDocument, SourceFormat};
use crate::pipeline::{flat, structured};
use crate::topics::{load_topic, Topic};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// The source files a topic offers, any of which may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSources {
    pub html: Option<PathBuf>,
    pub structured: Option<PathBuf>,
    pub flat_text: Option<PathBuf>,
}

impl TopicSources {
    pub fn is_empty(&self) -> bool {
        self.html.is_none() && self.structured.is_none() && self.flat_text.is_none()
    }

    /// The source to convert when there is no HTML yet: structured first,
    /// flat-text second.
    pub fn conversion_source(&self) -> Option<(&Path, SourceFormat)> {
        self.structured
            .as_deref()
            .map(|p| (p, SourceFormat::StructuredDocument))
            .or_else(|| {
                self.flat_text
                    .as_deref()
                    .map(|p| (p, SourceFormat::FlatTextExtract))
            })
    }
}

/// Same name, `.html` extension.
pub fn html_target(source: &Path) -> PathBuf {
    source.with_extension("html")
}

/// Convert one in-memory source document to HTML.
///
/// CPU-bound; async callers should go through the blocking pool.
pub fn convert_document(
    doc: &SourceDocument,
    config: &StudyConfig,
) -> Result<String, DocumentError> {
    match doc.format {
        SourceFormat::StructuredDocument => {
            doc.check_structured_magic()?;
            structured::docx_to_html(&doc.bytes, config.max_part_bytes)
        }
        SourceFormat::FlatTextExtract => {
            let text = extract_flat_text(doc)?;
            Ok(flat::flat_text_to_html(&text))
        }
        SourceFormat::Html => Err(DocumentError::Unsupported(doc.format.to_string())),
    }
}

/// One-off conversion of a single file, without persisting anything.
///
/// HTML inputs are returned unchanged.
pub async fn convert_file(path: &Path, config: &StudyConfig) -> Result<String, StudyHtmlError> {
    let doc = SourceDocument::read(path).await?;
    if doc.format == SourceFormat::Html {
        return Ok(String::from_utf8_lossy(&doc.bytes).into_owned());
    }
    convert_blocking(doc, config.clone()).await
}

async fn convert_blocking(
    doc: SourceDocument,
    config: StudyConfig,
) -> Result<String, StudyHtmlError> {
    let path = doc.path.clone();
    tokio::task::spawn_blocking(move || convert_document(&doc, &config))
        .await
        .map_err(|e| StudyHtmlError::Internal(format!("conversion task failed: {e}")))?
        .map_err(|source| StudyHtmlError::ConversionFailed { path, source })
}

/// Serves topic HTML, converting and persisting on first request.
pub struct Converter {
    config: StudyConfig,
    in_flight: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Converter {
    pub fn new(config: StudyConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Look up a topic by id under the configured root and render it.
    pub async fn render_id(&self, id: &str) -> Result<RenderedContent, StudyHtmlError> {
        let topic = load_topic(&self.config.topics_root, id).await?;
        self.render_topic(&topic).await
    }

    pub async fn render_topic(&self, topic: &Topic) -> Result<RenderedContent, StudyHtmlError> {
        self.render(&topic.id, &topic.sources()).await
    }

    /// Produce HTML for a set of sources.
    ///
    /// `label` names the topic in errors and logs.
    pub async fn render(
        &self,
        label: &str,
        sources: &TopicSources,
    ) -> Result<RenderedContent, StudyHtmlError> {
        let start = Instant::now();

        if let Some(path) = &sources.html {
            debug!("Serving existing HTML for '{}': {}", label, path.display());
            return Ok(RenderedContent {
                html: read_html(path).await?,
                path: Some(path.clone()),
                origin: ContentOrigin::Existing,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let (source, format) =
            sources
                .conversion_source()
                .ok_or_else(|| StudyHtmlError::ContentAbsent {
                    topic: label.to_string(),
                })?;

        let target = html_target(source);
        let slot = self.claim(&target)?;
        let _guard = slot.lock.lock().await;
        let rendered = self
            .convert_and_persist(label, source, format, &target, start)
            .await?;
        Ok(rendered)
    }

    async fn convert_and_persist(
        &self,
        label: &str,
        source: &Path,
        format: SourceFormat,
        target: &Path,
        start: Instant,
    ) -> Result<RenderedContent, StudyHtmlError> {
        let persist = self.config.persist_converted;

        if persist && tokio::fs::try_exists(target).await.unwrap_or(false) {
            debug!(
                "'{}' already converted to {}, skipping conversion",
                label,
                target.display()
            );
            return Ok(RenderedContent {
                html: read_html(target).await?,
                path: Some(target.to_path_buf()),
                origin: ContentOrigin::Existing,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        info!("Converting {} for '{}': {}", format, label, source.display());
        let doc = SourceDocument::read(source).await?;
        let html = convert_blocking(doc, self.config.clone()).await?;

        let path = if persist {
            write_html_atomic(target, &html).await?;
            info!("Persisted {} ({} bytes)", target.display(), html.len());
            Some(target.to_path_buf())
        } else {
            None
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Converted '{}' in {}ms", label, duration_ms);
        Ok(RenderedContent {
            html,
            path,
            origin: ContentOrigin::Converted { format },
            duration_ms,
        })
    }

    fn claim(&self, target: &Path) -> Result<InFlight<'_>, StudyHtmlError> {
        let mut map = self
            .in_flight
            .lock()
            .map_err(|_| StudyHtmlError::Internal("in-flight map poisoned".into()))?;
        Ok(InFlight {
            converter: self,
            target: target.to_path_buf(),
            lock: Arc::clone(map.entry(target.to_path_buf()).or_default()),
        })
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// A claim on one target's conversion lock.
///
/// Dropping it, whether the render finished or was cancelled while waiting,
/// removes the map entry once no other claim on the target remains.
struct InFlight<'a> {
    converter: &'a Converter,
    target: PathBuf,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.converter.in_flight.lock() {
            // Give up this handle while holding the map lock so the count
            // below cannot race another claim's drop.
            drop(std::mem::take(&mut self.lock));
            if map
                .get(&self.target)
                .is_some_and(|l| Arc::strong_count(l) == 1)
            {
                map.remove(&self.target);
            }
        }
    }
}

async fn read_html(path: &Path) -> Result<String, StudyHtmlError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StudyHtmlError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write through a temp file in the target directory, then rename, so a
/// reader never sees a half-written file.
async fn write_html_atomic(target: &Path, html: &str) -> Result<(), StudyHtmlError> {
    let path = target.to_path_buf();
    let body = html.to_owned();
    let dest = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| StudyHtmlError::Internal(format!("write task failed: {e}")))?
    .map_err(|source| StudyHtmlError::OutputWriteFailed { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn structured_beats_flat_text() {
        let sources = TopicSources {
            html: None,
            structured: Some("t/notes.docx".into()),
            flat_text: Some("t/notes.pdf".into()),
        };
        let (path, format) = sources.conversion_source().unwrap();
        assert_eq!(path, Path::new("t/notes.docx"));
        assert_eq!(format, SourceFormat::StructuredDocument);
    }

    #[test]
    fn flat_text_when_alone() {
        let sources = TopicSources {
            flat_text: Some("t/notes.pdf".into()),
            ..Default::default()
        };
        assert_eq!(
            sources.conversion_source().map(|(_, f)| f),
            Some(SourceFormat::FlatTextExtract)
        );
        assert!(TopicSources::default().conversion_source().is_none());
        assert!(TopicSources::default().is_empty());
    }

    #[test]
    fn sibling_html_path() {
        assert_eq!(
            html_target(Path::new("a/b/Notes.v2.docx")),
            PathBuf::from("a/b/Notes.v2.html")
        );
    }

    #[test]
    fn html_is_not_converted() {
        let doc = SourceDocument::from_bytes("x.html", SourceFormat::Html, b"<p/>".to_vec());
        assert!(matches!(
            convert_document(&doc, &StudyConfig::default()),
            Err(DocumentError::Unsupported(_))
        ));
    }

    #[test]
    fn mislabelled_docx_fails_fast() {
        let doc = SourceDocument::from_bytes(
            "x.docx",
            SourceFormat::StructuredDocument,
            b"%PDF-1.4".to_vec(),
        );
        assert!(matches!(
            convert_document(&doc, &StudyConfig::default()),
            Err(DocumentError::NotAZip(_))
        ));
    }

    #[tokio::test]
    async fn absent_content_is_not_a_failure() {
        let converter = Converter::new(StudyConfig::default());
        let err = converter
            .render("renal/wilms", &TopicSources::default())
            .await
            .unwrap_err();
        assert!(err.is_content_absent());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_its_lock() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "HEADING\nbody").unwrap();
        let sources = TopicSources {
            flat_text: Some(txt.clone()),
            ..Default::default()
        };

        let converter = Converter::new(StudyConfig::default());
        let held = converter.claim(&html_target(&txt)).unwrap();
        let guard = held.lock.lock().await;

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            converter.render("t", &sources),
        )
        .await;
        assert!(waited.is_err(), "render should still be waiting on the lock");
        assert_eq!(converter.in_flight_len(), 1);

        drop(guard);
        drop(held);
        assert_eq!(converter.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn lock_map_is_drained_after_render() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "HEADING\nbody").unwrap();

        let converter = Converter::new(StudyConfig::default());
        let sources = TopicSources {
            flat_text: Some(txt),
            ..Default::default()
        };
        converter.render("t", &sources).await.unwrap();
        assert_eq!(converter.in_flight_len(), 0);
    }
}
