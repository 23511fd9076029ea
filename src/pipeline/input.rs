//! Source documents: read a file once, tag its format, and reduce flat-text
//! sources to plain text.
//!
//! The format comes from the file extension. Magic bytes are checked before
//! any parser runs so a mislabelled file fails with a readable conversion
//! error instead of a parser crash deep inside the zip or PDF reader.

use crate::error::{DocumentError, StudyHtmlError};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// What kind of source a document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// A PDF (reduced to its text layer) or a plain `.txt` extract.
    FlatTextExtract,
    /// A `.docx` word-processor document.
    StructuredDocument,
    /// Already HTML; served as-is.
    Html,
}

impl SourceFormat {
    /// Format from the file extension, case-insensitive.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(Self::StructuredDocument),
            "pdf" | "txt" => Some(Self::FlatTextExtract),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlatTextExtract => "flat-text-extract",
            Self::StructuredDocument => "structured-document",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable source buffer plus its format tag.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn from_bytes(path: impl Into<PathBuf>, format: SourceFormat, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            format,
            bytes,
        }
    }

    /// Read a file and tag it by extension.
    pub async fn read(path: &Path) -> Result<Self, StudyHtmlError> {
        let format =
            SourceFormat::from_path(path).ok_or_else(|| StudyHtmlError::ConversionFailed {
                path: path.to_path_buf(),
                source: DocumentError::Unsupported(
                    path.extension()
                        .map(|e| e.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "<none>".into()),
                ),
            })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StudyHtmlError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!(
            "Read {} source {} ({} bytes)",
            format,
            path.display(),
            bytes.len()
        );
        Ok(Self::from_bytes(path, format, bytes))
    }

    fn has_pdf_extension(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    }

    /// Cheap container check before handing bytes to the zip reader.
    pub fn check_structured_magic(&self) -> Result<(), DocumentError> {
        if self.bytes.starts_with(ZIP_MAGIC) {
            Ok(())
        } else {
            Err(DocumentError::NotAZip(format!(
                "expected zip header, found {:02x?}",
                &self.bytes[..self.bytes.len().min(4)]
            )))
        }
    }
}

/// Reduce a flat-text source to plain text.
///
/// PDFs go through `pdf-extract`, which is CPU-bound; call this from the
/// blocking pool. Anything else is decoded as UTF-8, replacing invalid
/// sequences.
pub fn extract_flat_text(doc: &SourceDocument) -> Result<String, DocumentError> {
    if doc.bytes.starts_with(PDF_MAGIC) {
        let text = extract_pdf_text(&doc.bytes)?;
        debug!("Extracted {} chars of PDF text", text.len());
        return Ok(text);
    }
    if doc.has_pdf_extension() {
        return Err(DocumentError::PdfExtract(format!(
            "missing %PDF header in {}",
            doc.path.display()
        )));
    }
    Ok(String::from_utf8_lossy(&doc.bytes).into_owned())
}

/// Run `pdf-extract`, turning its panics into extraction errors.
///
/// The extractor panics rather than erroring on some structurally valid
/// files, for example a content stream that selects a font the page never
/// defines.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, DocumentError> {
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| DocumentError::PdfExtract(e.to_string())),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!("pdf-extract panicked: {}", reason);
            Err(DocumentError::PdfExtract(format!("extractor panicked: {reason}")))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-page PDF around one content stream. Object 5 is a Helvetica
    /// font; `resources` decides whether the page can see it.
    fn pdf_bytes(content: &str, resources: &str) -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R{resources} >>"),
            format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
        ];
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n", objects.len() + 1)
                .as_bytes(),
        );
        out
    }

    #[test]
    fn pdf_text_layer_is_extracted() {
        let doc = SourceDocument::from_bytes(
            "x.pdf",
            SourceFormat::FlatTextExtract,
            pdf_bytes(
                "BT /F1 12 Tf 72 720 Td (Nephroblastoma) Tj ET",
                " /Resources << /Font << /F1 5 0 R >> >>",
            ),
        );
        let text = extract_flat_text(&doc).unwrap();
        assert!(text.contains("Nephroblastoma"), "got: {text:?}");
    }

    #[test]
    fn undefined_font_is_an_extraction_error() {
        let doc = SourceDocument::from_bytes(
            "x.pdf",
            SourceFormat::FlatTextExtract,
            pdf_bytes("BT /F9 12 Tf 72 720 Td (Nephroblastoma) Tj ET", ""),
        );
        match extract_flat_text(&doc) {
            Err(DocumentError::PdfExtract(msg)) => assert!(msg.contains("panicked"), "got: {msg}"),
            other => panic!("expected PdfExtract error, got {other:?}"),
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/Notes.DOCX")),
            Some(SourceFormat::StructuredDocument)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("a/notes.pdf")),
            Some(SourceFormat::FlatTextExtract)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("a/notes.txt")),
            Some(SourceFormat::FlatTextExtract)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("a/notes.html")),
            Some(SourceFormat::Html)
        );
        assert_eq!(SourceFormat::from_path(Path::new("a/notes.mp3")), None);
        assert_eq!(SourceFormat::from_path(Path::new("a/notes")), None);
    }

    #[test]
    fn txt_is_decoded_lossily() {
        let doc = SourceDocument::from_bytes(
            "x.txt",
            SourceFormat::FlatTextExtract,
            b"caf\xe9 line\nnext".to_vec(),
        );
        let text = extract_flat_text(&doc).unwrap();
        assert!(text.starts_with("caf"));
        assert!(text.ends_with(" line\nnext"));
    }

    #[test]
    fn pdf_without_header_fails() {
        let doc = SourceDocument::from_bytes(
            "x.pdf",
            SourceFormat::FlatTextExtract,
            b"hello".to_vec(),
        );
        assert!(matches!(
            extract_flat_text(&doc),
            Err(DocumentError::PdfExtract(_))
        ));
    }

    #[test]
    fn structured_magic_check() {
        let ok = SourceDocument::from_bytes(
            "x.docx",
            SourceFormat::StructuredDocument,
            b"PK\x03\x04rest".to_vec(),
        );
        assert!(ok.check_structured_magic().is_ok());
        let bad = SourceDocument::from_bytes("x.docx", SourceFormat::StructuredDocument, b"%P".to_vec());
        assert!(matches!(
            bad.check_structured_magic(),
            Err(DocumentError::NotAZip(_))
        ));
    }

    #[tokio::test]
    async fn read_rejects_unknown_extension() {
        let err = SourceDocument::read(Path::new("/nonexistent/file.xyz"))
            .await
            .unwrap_err();
        assert!(err.is_conversion_failure());
    }

    #[tokio::test]
    async fn read_missing_file() {
        let err = SourceDocument::read(Path::new("/nonexistent/file.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyHtmlError::ReadFailed { .. }));
    }
}
