//! Orchestrator and topic-discovery tests against scratch topic trees.
//!
//! DOCX fixtures are synthesised with `zip`. Flat-text fixtures are mostly
//! `.txt` extracts, plus a few single-page PDFs assembled by hand.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyhtml::{
    discover_topics, load_topic, ContentOrigin, Converter, SourceFormat, StudyConfig,
    StudyHtmlError, TopicSources,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn docx_bytes(body: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let styles = r#"<?xml version="1.0"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
<w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
</w:styles>"#;

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        for (name, xml) in [("word/document.xml", document.as_str()), ("word/styles.xml", styles)] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

fn para(style: Option<&str>, text: &str) -> String {
    let ppr = style
        .map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#))
        .unwrap_or_default();
    format!("<w:p>{ppr}<w:r><w:t>{text}</w:t></w:r></w:p>")
}

fn topic_dir(root: &Path, id: &str) -> PathBuf {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(root: &Path) -> StudyConfig {
    StudyConfig::builder().topics_root(root).build().unwrap()
}

fn html_files(dir: &Path) -> Vec<PathBuf> {
    let mut v: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "html"))
        .collect();
    v.sort();
    v
}

/// Single-page PDF with one content stream. Object 5 is a Helvetica font;
/// `resources` decides whether the page references it.
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

const HELVETICA_RESOURCES: &str = " /Resources << /Font << /F1 5 0 R >> >>";

// ── Source priority and persistence ──────────────────────────────────────────

#[tokio::test]
async fn docx_is_converted_once_then_served_from_disk() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "renal/wilms-tumour");
    let body = [
        para(Some("Heading1"), "Background"),
        para(None, "Nephroblastoma."),
        para(Some("Heading2"), "References"),
        para(None, "Beckwith 1990."),
        para(Some("Heading1"), "Appendix"),
    ]
    .concat();
    std::fs::write(dir.join("notes.docx"), docx_bytes(&body)).unwrap();
    std::fs::write(dir.join("notes.txt"), "FLAT TEXT SHOULD LOSE").unwrap();

    let converter = Converter::new(config(root.path()));
    let first = converter.render_id("renal/wilms-tumour").await.unwrap();
    assert_eq!(
        first.origin,
        ContentOrigin::Converted {
            format: SourceFormat::StructuredDocument
        }
    );
    assert!(first.html.starts_with("<div class=\"docx-content\">"));
    assert!(!first.html.contains("FLAT TEXT"));
    assert!(first.html.find(">Appendix<").unwrap() < first.html.find(">References<").unwrap());

    let persisted = dir.join("notes.html");
    assert_eq!(first.path.as_deref(), Some(persisted.as_path()));
    let on_disk = std::fs::read_to_string(&persisted).unwrap();
    assert_eq!(on_disk, first.html);

    // The next request sees the .html during discovery and skips conversion.
    let second = converter.render_id("renal/wilms-tumour").await.unwrap();
    assert_eq!(second.origin, ContentOrigin::Existing);
    assert_eq!(second.html, first.html);
}

#[tokio::test]
async fn reconversion_is_byte_identical() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "gi/coeliac");
    std::fs::write(
        dir.join("extract.txt"),
        "COELIAC DISEASE\nMarsh grading:\n• intraepithelial lymphocytes\nGrade\tFinding\n1\tIEL only\n2\tCrypt hyperplasia\n\nVillous atrophy & more.",
    )
    .unwrap();

    let converter = Converter::new(config(root.path()));
    let first = converter.render_id("gi/coeliac").await.unwrap();
    let persisted = std::fs::read(dir.join("extract.html")).unwrap();
    std::fs::remove_file(dir.join("extract.html")).unwrap();

    let again = converter.render_id("gi/coeliac").await.unwrap();
    assert!(again.was_converted());
    assert_eq!(std::fs::read(dir.join("extract.html")).unwrap(), persisted);
    assert_eq!(first.html, again.html);
    assert!(first.html.starts_with("<div class=\"pdf-content\">"));
    assert_eq!(first.html.matches("<table").count(), 1);
}

#[tokio::test]
async fn authored_html_wins_over_everything() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "cns/glioma");
    std::fs::write(dir.join("custom.html"), "<p>hand written</p>").unwrap();
    std::fs::write(dir.join("notes.docx"), docx_bytes(&para(None, "x"))).unwrap();

    let converter = Converter::new(config(root.path()));
    let r = converter.render_id("cns/glioma").await.unwrap();
    assert_eq!(r.origin, ContentOrigin::Existing);
    assert_eq!(r.html, "<p>hand written</p>");
    assert!(!dir.join("notes.html").exists());
}

#[tokio::test]
async fn pdf_text_layer_is_converted_and_persisted() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "renal/wilms");
    std::fs::write(
        dir.join("notes.pdf"),
        pdf_bytes("BT /F1 12 Tf 72 720 Td (Nephroblastoma) Tj ET", HELVETICA_RESOURCES),
    )
    .unwrap();

    let converter = Converter::new(config(root.path()));
    let first = converter.render_id("renal/wilms").await.unwrap();
    assert_eq!(
        first.origin,
        ContentOrigin::Converted {
            format: SourceFormat::FlatTextExtract
        }
    );
    assert!(first.html.starts_with(r#"<div class="pdf-content"#), "got: {}", first.html);
    assert!(first.html.contains("Nephroblastoma"));

    let persisted = dir.join("notes.html");
    assert_eq!(first.path.as_deref(), Some(persisted.as_path()));
    assert_eq!(std::fs::read_to_string(&persisted).unwrap(), first.html);

    let second = converter.render_id("renal/wilms").await.unwrap();
    assert_eq!(second.origin, ContentOrigin::Existing);
    assert_eq!(second.html, first.html);
}

#[tokio::test]
async fn persistence_can_be_disabled() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "skin/melanoma");
    std::fs::write(dir.join("notes.txt"), "ABCDE RULE").unwrap();

    let config = StudyConfig::builder()
        .topics_root(root.path())
        .persist_converted(false)
        .build()
        .unwrap();
    let converter = Converter::new(config);
    let r = converter.render_id("skin/melanoma").await.unwrap();
    assert!(r.was_converted());
    assert!(r.path.is_none());
    assert!(html_files(&dir).is_empty());
}

// ── Failure signals ──────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_docx_is_a_conversion_failure_and_writes_nothing() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "renal/broken");
    std::fs::write(dir.join("notes.docx"), b"PK\x03\x04 this is not really a zip").unwrap();

    let converter = Converter::new(config(root.path()));
    let err = converter.render_id("renal/broken").await.unwrap_err();
    assert!(err.is_conversion_failure(), "got {err:?}");
    assert!(!err.is_content_absent());
    assert!(err.to_string().contains("notes.docx"));
    assert!(html_files(&dir).is_empty(), "no partial HTML may be left behind");
}

#[tokio::test]
async fn pdf_with_undefined_font_is_a_conversion_failure() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "renal/no-font");
    std::fs::write(
        dir.join("notes.pdf"),
        pdf_bytes("BT /F9 12 Tf 72 720 Td (Nephroblastoma) Tj ET", ""),
    )
    .unwrap();

    let converter = Converter::new(config(root.path()));
    let err = converter.render_id("renal/no-font").await.unwrap_err();
    assert!(
        matches!(
            err,
            StudyHtmlError::ConversionFailed {
                source: studyhtml::DocumentError::PdfExtract(_),
                ..
            }
        ),
        "got {err:?}"
    );
    assert!(html_files(&dir).is_empty());

    let err = studyhtml::convert_file(&dir.join("notes.pdf"), &config(root.path()))
        .await
        .unwrap_err();
    assert!(err.is_conversion_failure(), "got {err:?}");
}

#[tokio::test]
async fn docx_without_document_part_fails() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "renal/empty-zip");
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        zip.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"hi").unwrap();
        zip.finish().unwrap();
    }
    std::fs::write(dir.join("notes.docx"), buf.into_inner()).unwrap();

    let converter = Converter::new(config(root.path()));
    let err = converter.render_id("renal/empty-zip").await.unwrap_err();
    assert!(matches!(
        err,
        StudyHtmlError::ConversionFailed {
            source: studyhtml::DocumentError::MissingPart(_),
            ..
        }
    ));
}

#[tokio::test]
async fn topic_without_sources_is_content_absent() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "heme/lymphoma");
    std::fs::write(dir.join("lecture.mp3"), b"ID3").unwrap();

    let converter = Converter::new(config(root.path()));
    let err = converter.render_id("heme/lymphoma").await.unwrap_err();
    assert!(err.is_content_absent());
    assert!(!err.is_conversion_failure());
}

#[tokio::test]
async fn unknown_and_malformed_topic_ids() {
    let root = TempDir::new().unwrap();
    let converter = Converter::new(config(root.path()));

    let err = converter.render_id("nope/missing").await.unwrap_err();
    assert!(matches!(err, StudyHtmlError::TopicNotFound { .. }));

    let err = converter.render_id("../../etc").await.unwrap_err();
    assert!(matches!(err, StudyHtmlError::InvalidTopicId { .. }));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_requests_convert_once() {
    let root = TempDir::new().unwrap();
    let dir = topic_dir(root.path(), "lung/adenocarcinoma");
    let body = (0..200)
        .map(|i| para(None, &format!("Paragraph {i}")))
        .collect::<String>();
    let docx = dir.join("notes.docx");
    std::fs::write(&docx, docx_bytes(&body)).unwrap();

    let converter = Arc::new(Converter::new(config(root.path())));
    let sources = TopicSources {
        structured: Some(docx),
        ..Default::default()
    };

    let tasks = (0..8).map(|_| {
        let converter = Arc::clone(&converter);
        let sources = sources.clone();
        tokio::spawn(async move { converter.render("lung/adenocarcinoma", &sources).await })
    });
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let converted = results.iter().filter(|r| r.was_converted()).count();
    assert_eq!(converted, 1, "exactly one request should convert");
    assert!(results.windows(2).all(|w| w[0].html == w[1].html));
    assert_eq!(html_files(&dir).len(), 1);
}

// ── Discovery ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn discovery_lists_sorted_topics_with_flags() {
    let root = TempDir::new().unwrap();
    let a = topic_dir(root.path(), "renal-pathology/wilms-tumour");
    std::fs::write(a.join("Notes.DOCX"), b"x").unwrap();
    std::fs::write(a.join("talk.wav"), b"x").unwrap();
    let b = topic_dir(root.path(), "renal-pathology/angiomyolipoma");
    std::fs::write(b.join("slides.pdf"), b"x").unwrap();
    std::fs::write(b.join("cover.webp"), b"x").unwrap();
    topic_dir(root.path(), "breast/phyllodes");
    std::fs::write(root.path().join("stray-file.txt"), b"x").unwrap();

    let topics = discover_topics(root.path()).await.unwrap();
    let ids: Vec<_> = topics.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "breast/phyllodes",
            "renal-pathology/angiomyolipoma",
            "renal-pathology/wilms-tumour"
        ]
    );

    let wilms = &topics[2];
    assert_eq!(wilms.category, "Renal Pathology");
    assert_eq!(wilms.title, "Wilms Tumour");
    assert!(wilms.has_docx && wilms.has_audio);
    assert!(!wilms.has_pdf && !wilms.has_image && !wilms.has_html);
    assert_eq!(
        wilms.audio_path.as_deref(),
        Some("/api/topics/renal-pathology/wilms-tumour/audio")
    );

    let aml = &topics[1];
    assert!(aml.has_pdf && aml.has_image);
    assert_eq!(aml.sources().flat_text, Some(b.join("slides.pdf")));
}

#[tokio::test]
async fn missing_root_lists_nothing() {
    let root = TempDir::new().unwrap();
    let topics = discover_topics(&root.path().join("absent")).await.unwrap();
    assert!(topics.is_empty());
}

#[test]
fn persisted_html_shows_up_on_next_listing() {
    tokio_test::block_on(async {
        let root = TempDir::new().unwrap();
        let dir = topic_dir(root.path(), "gi/barretts");
        std::fs::write(dir.join("notes.txt"), "INTESTINAL METAPLASIA").unwrap();

        let before = load_topic(root.path(), "gi/barretts").await.unwrap();
        assert!(!before.has_html);

        Converter::new(config(root.path()))
            .render_topic(&before)
            .await
            .unwrap();

        let after = load_topic(root.path(), "gi/barretts").await.unwrap();
        assert!(after.has_html);
        assert_eq!(after.html_path.as_deref(), Some("/api/topics/gi/barretts/html"));
    });
}
