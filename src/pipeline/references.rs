//! Moves a "References" section to the end of an HTML fragment.
//!
//! Documents often put the reference list before appendices or trailing
//! sections. This pass finds the first heading whose text normalises to
//! `reference` or `references` and relocates that heading plus everything
//! up to the next heading of the same or higher rank. Subsections of the
//! references (deeper headings) travel with it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::debug;

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static RE_REFERENCES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^references?$").unwrap());

/// A heading element found in the fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingRecord {
    pub level: u8,
    /// Normalised heading text (see [`normalize_heading_text`]).
    pub text: String,
    /// Byte offset of the opening `<h` tag.
    pub start: usize,
    /// Byte offset where this heading's section ends: the start of the next
    /// heading with level ≤ this one, or the end of the fragment.
    pub span_end: usize,
}

/// Collect all headings in document order with their section spans.
pub fn collect_headings(html: &str) -> Vec<HeadingRecord> {
    let mut records: Vec<HeadingRecord> = RE_HEADING
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let level = caps.get(1)?.as_str().parse().ok()?;
            Some(HeadingRecord {
                level,
                text: normalize_heading_text(caps.get(2)?.as_str()),
                start: whole.start(),
                span_end: html.len(),
            })
        })
        .collect();

    for i in 0..records.len() {
        let level = records[i].level;
        if let Some(next) = records[i + 1..].iter().find(|r| r.level <= level) {
            records[i].span_end = next.start;
        }
    }
    records
}

/// Strip tags, decode the common entities, drop punctuation, collapse
/// whitespace and lowercase.
pub fn normalize_heading_text(inner: &str) -> String {
    let text = RE_TAG.replace_all(inner, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'");
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `true` for "Reference", "REFERENCES", "References:" and the like.
pub fn is_references_heading(normalized: &str) -> bool {
    RE_REFERENCES.is_match(normalized)
}

/// Relocate the first references section to the end of the fragment.
///
/// Returns the input unchanged (borrowed) when there is no such heading.
pub fn relocate_references(html: &str) -> Cow<'_, str> {
    let headings = collect_headings(html);
    let Some(section) = headings.iter().find(|h| is_references_heading(&h.text)) else {
        return Cow::Borrowed(html);
    };
    if section.span_end == html.len() {
        // Already last.
        return Cow::Borrowed(html);
    }

    debug!(
        "Relocating references section (h{}, {} bytes) to end of document",
        section.level,
        section.span_end - section.start
    );

    let moved = &html[section.start..section.span_end];
    let mut rest = String::with_capacity(html.len());
    rest.push_str(&html[..section.start]);
    rest.push_str(&html[section.span_end..]);

    Cow::Owned(format!("{}\n{}", rest.trim_end(), moved.trim_end()))
}
