//! Topic discovery over a `<root>/<category>/<topic>/` directory tree.
//!
//! Nothing is cached between calls: every listing re-scans the filesystem,
//! so a freshly persisted `.html` shows up as `has_html` on the next call.

use crate::convert::TopicSources;
use crate::error::StudyHtmlError;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Files found in one topic directory (first match per kind, by file name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFiles {
    pub docx: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
    pub txt: Option<PathBuf>,
    pub html: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

impl TopicFiles {
    /// Scan one topic directory. Subdirectories are ignored.
    pub async fn scan(dir: &Path) -> Result<Self, StudyHtmlError> {
        let mut names = Vec::new();
        let mut rd = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| scan_failed(dir, e))?;
        while let Some(entry) = rd.next_entry().await.map_err(|e| scan_failed(dir, e))? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                names.push(entry.path());
            }
        }
        // read_dir order is unspecified; sort for stable picks.
        names.sort();

        let mut files = TopicFiles::default();
        for path in names {
            let Some(ext) = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
            else {
                continue;
            };
            let slot = match ext.as_str() {
                "docx" => &mut files.docx,
                "pdf" => &mut files.pdf,
                "txt" => &mut files.txt,
                "html" => &mut files.html,
                e if AUDIO_EXTENSIONS.contains(&e) => &mut files.audio,
                e if IMAGE_EXTENSIONS.contains(&e) => &mut files.image,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(path);
            }
        }
        Ok(files)
    }

    /// Sources the conversion orchestrator can pick from.
    pub fn sources(&self) -> TopicSources {
        TopicSources {
            html: self.html.clone(),
            structured: self.docx.clone(),
            flat_text: self.pdf.clone().or_else(|| self.txt.clone()),
        }
    }
}

/// A study topic as listed to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// `category/slug`
    pub id: String,
    pub title: String,
    pub category: String,
    pub folder_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docx_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub has_docx: bool,
    pub has_pdf: bool,
    pub has_html: bool,
    pub has_audio: bool,
    pub has_image: bool,
    /// Absolute location of the topic directory on disk.
    #[serde(skip)]
    pub dir: PathBuf,
    #[serde(skip)]
    pub files: TopicFiles,
}

impl Topic {
    fn new(category_slug: &str, topic_slug: &str, dir: PathBuf, files: TopicFiles) -> Self {
        let id = format!("{category_slug}/{topic_slug}");
        let locator = |present: bool, kind: &str| present.then(|| format!("/api/topics/{id}/{kind}"));
        Self {
            title: title_case(topic_slug),
            category: title_case(category_slug),
            folder_path: id.clone(),
            docx_path: locator(files.docx.is_some(), "docx"),
            pdf_path: locator(files.pdf.is_some(), "pdf"),
            html_path: locator(files.html.is_some(), "html"),
            audio_path: locator(files.audio.is_some(), "audio"),
            image_path: locator(files.image.is_some(), "image"),
            has_docx: files.docx.is_some(),
            has_pdf: files.pdf.is_some(),
            has_html: files.html.is_some(),
            has_audio: files.audio.is_some(),
            has_image: files.image.is_some(),
            id,
            dir,
            files,
        }
    }

    pub fn sources(&self) -> TopicSources {
        self.files.sources()
    }
}

/// `renal-cell-carcinoma` → `Renal Cell Carcinoma`.
pub fn title_case(slug: &str) -> String {
    slug.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split and check a `category/slug` id.
pub fn parse_topic_id(id: &str) -> Result<(&str, &str), StudyHtmlError> {
    let invalid = |reason: &str| StudyHtmlError::InvalidTopicId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    let (category, slug) = id
        .split_once('/')
        .ok_or_else(|| invalid("expected 'category/topic'"))?;
    for segment in [category, slug] {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if segment.contains(['/', '\\']) {
            return Err(invalid("too many segments"));
        }
        let mut components = Path::new(segment).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(invalid("segment is not a plain name"));
        }
    }
    Ok((category, slug))
}

/// Resolve a topic id to its directory under `root`.
pub async fn resolve_topic_dir(root: &Path, id: &str) -> Result<PathBuf, StudyHtmlError> {
    let (category, slug) = parse_topic_id(id)?;
    let dir = root.join(category).join(slug);
    match tokio::fs::metadata(&dir).await {
        Ok(m) if m.is_dir() => Ok(dir),
        _ => Err(StudyHtmlError::TopicNotFound { id: id.to_string() }),
    }
}

/// Load one topic by id.
pub async fn load_topic(root: &Path, id: &str) -> Result<Topic, StudyHtmlError> {
    let dir = resolve_topic_dir(root, id).await?;
    let (category, slug) = parse_topic_id(id)?;
    let files = TopicFiles::scan(&dir).await?;
    Ok(Topic::new(category, slug, dir, files))
}

/// List every topic under `root`, sorted by category then title.
///
/// A missing root yields an empty list.
pub async fn discover_topics(root: &Path) -> Result<Vec<Topic>, StudyHtmlError> {
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        debug!("Topics root {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut topics = Vec::new();
    for (category_slug, category_dir) in subdirectories(root).await? {
        for (topic_slug, topic_dir) in subdirectories(&category_dir).await? {
            match TopicFiles::scan(&topic_dir).await {
                Ok(files) => topics.push(Topic::new(&category_slug, &topic_slug, topic_dir, files)),
                Err(e) => warn!("Skipping topic {category_slug}/{topic_slug}: {e}"),
            }
        }
    }

    topics.sort_by(|a, b| {
        a.category
            .to_lowercase()
            .cmp(&b.category.to_lowercase())
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
    debug!("Discovered {} topics under {}", topics.len(), root.display());
    Ok(topics)
}

/// Directory children with UTF-8 names.
async fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>, StudyHtmlError> {
    let mut out = Vec::new();
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| scan_failed(dir, e))?;
    while let Some(entry) = rd.next_entry().await.map_err(|e| scan_failed(dir, e))? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            out.push((name, entry.path()));
        }
    }
    Ok(out)
}

fn scan_failed(path: &Path, source: std::io::Error) -> StudyHtmlError {
    StudyHtmlError::ScanFailed {
        path: path.to_path_buf(),
        source,
    }
}
