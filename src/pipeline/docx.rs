//! DOCX reader: walks the OOXML parts of a word-processor document and
//! produces a paragraph/style stream.
//!
//! A `.docx` is a zip container. Three parts matter here:
//!
//! - `word/document.xml`: paragraphs (`w:p`), runs (`w:r`), text (`w:t`)
//!   and tables (`w:tbl`). Required.
//! - `word/styles.xml`: maps style ids (`Heading1`) to display names
//!   (`heading 1`). Optional; without it the style id is used as the name.
//! - `word/numbering.xml`: tells whether a numbered paragraph belongs to an
//!   ordered or a bullet list. Optional; without it lists are bullets.
//!
//! Everything else (images, headers, footers, comments, tracked deletions,
//! field codes) is ignored. The reader never interprets formatting beyond
//! bold, italic, tabs and line breaks.

use crate::error::DocumentError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const NUMBERING_PART: &str = "word/numbering.xml";

/// One block-level element of the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// A paragraph with its resolved style and list membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    /// Style id as written in the paragraph properties (`Heading1`).
    pub style_id: Option<String>,
    /// Display name from `styles.xml` (`heading 1`), if known.
    pub style_name: Option<String>,
    /// Set when the paragraph carries numbering properties.
    pub list: Option<ListRef>,
    pub inlines: Vec<Inline>,
}

impl Paragraph {
    /// Name to look up in the style map: display name, else style id.
    pub fn effective_style(&self) -> Option<&str> {
        self.style_name.as_deref().or(self.style_id.as_deref())
    }

    /// `true` when there is nothing visible to render.
    pub fn is_empty(&self) -> bool {
        self.inlines.iter().all(|i| match i {
            Inline::Text { text, .. } => text.trim().is_empty(),
            Inline::Break => false,
        })
    }
}

/// Numbering attached to a paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRef {
    pub num_id: String,
    /// Nesting depth, 0-based (`w:ilvl`).
    pub level: usize,
    pub ordered: bool,
}

/// Run-level content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text {
        text: String,
        bold: bool,
        italic: bool,
    },
    Break,
}

/// A table: rows of cells, each cell a sequence of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<Vec<Block>>>,
}

/// Read a DOCX container into its block stream.
///
/// `max_part_bytes` caps how much of any one part is decompressed.
pub fn read_docx(bytes: &[u8], max_part_bytes: u64) -> Result<Vec<Block>, DocumentError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DocumentError::NotAZip(e.to_string()))?;

    let styles = match read_part(&mut archive, STYLES_PART, max_part_bytes)? {
        Some(xml) => parse_style_names(&xml)?,
        None => HashMap::new(),
    };
    let numbering = match read_part(&mut archive, NUMBERING_PART, max_part_bytes)? {
        Some(xml) => Numbering::parse(&xml)?,
        None => Numbering::default(),
    };
    let document = read_part(&mut archive, DOCUMENT_PART, max_part_bytes)?
        .ok_or_else(|| DocumentError::MissingPart(DOCUMENT_PART.to_string()))?;

    debug!(
        "DOCX parts: document {} bytes, {} styles, {} numbering definitions",
        document.len(),
        styles.len(),
        numbering.num_to_abstract.len()
    );

    let mut body = BodyParser {
        xml: PartReader::new(&document, DOCUMENT_PART),
        styles: &styles,
        numbering: &numbering,
    };
    body.parse_blocks(None)
}

// ── Zip access ───────────────────────────────────────────────────────────

/// Read one part, bounded. `Ok(None)` if the part does not exist.
fn read_part(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Option<Vec<u8>>, DocumentError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(DocumentError::NotAZip(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| DocumentError::NotAZip(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(DocumentError::EntryTooLarge {
            name: name.to_string(),
            limit: max_bytes,
        });
    }
    Ok(Some(out))
}

// ── XML helpers ──────────────────────────────────────────────────────────

struct PartReader<'a> {
    reader: Reader<&'a [u8]>,
    part: &'static str,
}

impl<'a> PartReader<'a> {
    fn new(xml: &'a [u8], part: &'static str) -> Self {
        Self {
            reader: Reader::from_reader(xml),
            part,
        }
    }

    fn next(&mut self) -> Result<Event<'a>, DocumentError> {
        self.reader.read_event().map_err(|e| self.error(e.to_string()))
    }

    fn error(&self, detail: impl Into<String>) -> DocumentError {
        DocumentError::Xml {
            part: self.part.to_string(),
            detail: detail.into(),
        }
    }

    fn unexpected_eof(&self, inside: &str) -> DocumentError {
        self.error(format!("unexpected end of document inside <{inside}>"))
    }
}

/// Value of the attribute with local name `name` (`w:val` → `val`).
fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// On/off toggles such as `<w:b/>` or `<w:b w:val="0"/>`.
fn toggle_on(e: &BytesStart<'_>) -> bool {
    !matches!(
        attr(e, b"val").as_deref(),
        Some("0") | Some("false") | Some("off")
    )
}

// ── styles.xml ───────────────────────────────────────────────────────────

fn parse_style_names(xml: &[u8]) -> Result<HashMap<String, String>, DocumentError> {
    let mut xml = PartReader::new(xml, STYLES_PART);
    let mut names = HashMap::new();
    let mut current: Option<String> = None;

    loop {
        match xml.next()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"style" => current = attr(&e, b"styleId"),
                b"name" => {
                    if let (Some(id), Some(name)) = (current.as_ref(), attr(&e, b"val")) {
                        names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"style" => current = None,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

// ── numbering.xml ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Numbering {
    /// `w:num/@numId` → `w:abstractNumId/@val`
    num_to_abstract: HashMap<String, String>,
    /// (abstractNumId, ilvl) → `w:numFmt/@val`
    formats: HashMap<(String, usize), String>,
}

impl Numbering {
    fn parse(xml: &[u8]) -> Result<Self, DocumentError> {
        let mut xml = PartReader::new(xml, NUMBERING_PART);
        let mut numbering = Numbering::default();
        let mut abstract_id: Option<String> = None;
        let mut level: Option<usize> = None;
        let mut num_id: Option<String> = None;

        loop {
            match xml.next()? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = attr(&e, b"abstractNumId"),
                    b"lvl" => level = attr(&e, b"ilvl").and_then(|v| v.parse().ok()),
                    b"numFmt" => {
                        if let (Some(a), Some(l), Some(fmt)) =
                            (abstract_id.as_ref(), level, attr(&e, b"val"))
                        {
                            numbering.formats.insert((a.clone(), l), fmt);
                        }
                    }
                    b"num" => num_id = attr(&e, b"numId"),
                    b"abstractNumId" => {
                        if let (Some(n), Some(a)) = (num_id.as_ref(), attr(&e, b"val")) {
                            numbering.num_to_abstract.insert(n.clone(), a);
                        }
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"abstractNum" => abstract_id = None,
                    b"lvl" => level = None,
                    b"num" => num_id = None,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(numbering)
    }

    /// Anything but a bullet (or no marker at all) is an ordered list.
    fn is_ordered(&self, num_id: &str, level: usize) -> bool {
        self.num_to_abstract
            .get(num_id)
            .and_then(|a| self.formats.get(&(a.clone(), level)))
            .is_some_and(|fmt| fmt != "bullet" && fmt != "none")
    }
}

// ── document.xml ─────────────────────────────────────────────────────────

struct BodyParser<'a, 'c> {
    xml: PartReader<'a>,
    styles: &'c HashMap<String, String>,
    numbering: &'c Numbering,
}

#[derive(Default)]
struct RunProps {
    bold: bool,
    italic: bool,
}

impl<'a, 'c> BodyParser<'a, 'c> {
    /// Read paragraphs and tables until `</until>` (or end of document).
    fn parse_blocks(&mut self, until: Option<&[u8]>) -> Result<Vec<Block>, DocumentError> {
        let mut blocks = Vec::new();
        loop {
            match self.xml.next()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"p" => blocks.push(Block::Paragraph(self.parse_paragraph()?)),
                    b"tbl" => blocks.push(Block::Table(self.parse_table()?)),
                    _ => {}
                },
                Event::End(e) if Some(e.local_name().as_ref()) == until => break,
                Event::Eof => match until {
                    Some(tag) => {
                        return Err(self.xml.unexpected_eof(&String::from_utf8_lossy(tag)))
                    }
                    None => break,
                },
                _ => {}
            }
        }
        Ok(blocks)
    }

    fn parse_table(&mut self) -> Result<Table, DocumentError> {
        let mut table = Table::default();
        loop {
            match self.xml.next()? {
                Event::Start(e) if e.local_name().as_ref() == b"tr" => {
                    let row = self.parse_row()?;
                    table.rows.push(row);
                }
                Event::End(e) if e.local_name().as_ref() == b"tbl" => break,
                Event::Eof => return Err(self.xml.unexpected_eof("tbl")),
                _ => {}
            }
        }
        Ok(table)
    }

    fn parse_row(&mut self) -> Result<Vec<Vec<Block>>, DocumentError> {
        let mut cells = Vec::new();
        loop {
            match self.xml.next()? {
                Event::Start(e) if e.local_name().as_ref() == b"tc" => {
                    cells.push(self.parse_blocks(Some(b"tc"))?);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"tc" => cells.push(Vec::new()),
                Event::End(e) if e.local_name().as_ref() == b"tr" => break,
                Event::Eof => return Err(self.xml.unexpected_eof("tr")),
                _ => {}
            }
        }
        Ok(cells)
    }

    /// Called just after `<w:p>`; consumes through the matching `</w:p>`.
    fn parse_paragraph(&mut self) -> Result<Paragraph, DocumentError> {
        let mut para = Paragraph::default();
        let mut nested_depth = 0usize;
        let mut run: Option<RunProps> = None;
        let mut in_text = false;
        let mut num_id: Option<String> = None;
        let mut level = 0usize;

        loop {
            let event = self.xml.next()?;
            let (e, is_start) = match &event {
                Event::Start(e) => (Some(e), true),
                Event::Empty(e) => (Some(e), false),
                _ => (None, false),
            };

            if let Some(e) = e {
                match e.local_name().as_ref() {
                    // Text boxes nest whole paragraphs inside a run.
                    b"p" if is_start => nested_depth += 1,
                    // Properties of text-box paragraphs belong to those paragraphs.
                    b"pStyle" | b"numId" | b"ilvl" if nested_depth > 0 => {}
                    b"pStyle" => para.style_id = attr(e, b"val"),
                    b"numId" => num_id = attr(e, b"val"),
                    b"ilvl" => level = attr(e, b"val").and_then(|v| v.parse().ok()).unwrap_or(0),
                    b"r" if is_start => run = Some(RunProps::default()),
                    b"b" => {
                        if let Some(r) = run.as_mut() {
                            r.bold = toggle_on(e);
                        }
                    }
                    b"i" => {
                        if let Some(r) = run.as_mut() {
                            r.italic = toggle_on(e);
                        }
                    }
                    b"t" if is_start => in_text = true,
                    b"tab" if run.is_some() => push_text(&mut para.inlines, "\t", run.as_ref()),
                    b"br" | b"cr" if run.is_some() => para.inlines.push(Inline::Break),
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Text(t) if in_text => {
                    let text = t.unescape().map_err(|e| self.xml.error(e.to_string()))?;
                    push_text(&mut para.inlines, &text, run.as_ref());
                }
                Event::CData(c) if in_text => {
                    push_text(&mut para.inlines, &String::from_utf8_lossy(&c), run.as_ref());
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"r" => run = None,
                    b"p" if nested_depth == 0 => break,
                    b"p" => nested_depth -= 1,
                    _ => {}
                },
                Event::Eof => return Err(self.xml.unexpected_eof("p")),
                _ => {}
            }
        }

        para.style_name = para
            .style_id
            .as_ref()
            .and_then(|id| self.styles.get(id).cloned());
        // numId 0 explicitly removes numbering.
        para.list = num_id.filter(|id| id != "0").map(|num_id| ListRef {
            ordered: self.numbering.is_ordered(&num_id, level),
            num_id,
            level,
        });
        Ok(para)
    }
}

/// Append text, merging with the previous run when formatting matches.
fn push_text(inlines: &mut Vec<Inline>, text: &str, run: Option<&RunProps>) {
    let (bold, italic) = run.map_or((false, false), |r| (r.bold, r.italic));
    if let Some(Inline::Text {
        text: prev,
        bold: b,
        italic: i,
    }) = inlines.last_mut()
    {
        if *b == bold && *i == italic {
            prev.push_str(text);
            return;
        }
    }
    inlines.push(Inline::Text {
        text: text.to_string(),
        bold,
        italic,
    });
}
