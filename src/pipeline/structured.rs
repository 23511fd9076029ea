//! Structured-document HTML builder: DOCX block stream → semantic HTML.
//!
//! Paragraph styles are looked up in a fixed table that maps the four
//! heading styles and `Normal` to tags with presentation classes. Numbered
//! paragraphs without a heading style become native `<ul>`/`<ol>` lists,
//! nested by their numbering level. Tables are kept as tables. After
//! rendering, the references section is moved to the end and the whole
//! fragment is wrapped in the `docx-content` container.

use crate::error::DocumentError;
use crate::pipeline::docx::{read_docx, Block, Inline, Paragraph, Table};
use crate::pipeline::html::{escape_html, wrap_container, STRUCTURED_CONTAINER_CLASS};
use crate::pipeline::references::relocate_references;
use tracing::debug;

/// Element a mapped style renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTarget {
    pub tag: &'static str,
    pub class: &'static str,
}

/// Style name (lowercase, spaces removed) → target element.
static STYLE_MAP: &[(&str, StyleTarget)] = &[
    ("heading1", StyleTarget { tag: "h1", class: "text-2xl font-bold mt-8 mb-4" }),
    ("heading2", StyleTarget { tag: "h2", class: "text-xl font-semibold mt-6 mb-3" }),
    ("heading3", StyleTarget { tag: "h3", class: "text-lg font-semibold mt-6 mb-3" }),
    ("heading4", StyleTarget { tag: "h4", class: "text-base font-semibold mt-4 mb-2" }),
    ("normal", StyleTarget { tag: "p", class: "mb-3" }),
];

/// Look up a style by display name or id, ignoring case and spaces, so
/// `Heading 1`, `heading 1` and `Heading1` all resolve to `h1`.
pub fn lookup_style(name: &str) -> Option<StyleTarget> {
    let key: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    STYLE_MAP
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, target)| *target)
}

/// Convert DOCX bytes to the wrapped HTML document.
///
/// Any failure reading the container or its XML is returned as-is; no
/// partial markup is produced.
pub fn docx_to_html(bytes: &[u8], max_part_bytes: u64) -> Result<String, DocumentError> {
    let blocks = read_docx(bytes, max_part_bytes)?;
    debug!("DOCX body: {} top-level blocks", blocks.len());
    Ok(blocks_to_html(&blocks))
}

/// Render, relocate references and wrap.
pub fn blocks_to_html(blocks: &[Block]) -> String {
    let body = render_blocks(blocks);
    let body = relocate_references(&body);
    wrap_container(STRUCTURED_CONTAINER_CLASS, &body)
}

/// Render blocks to unwrapped markup, one block element per line.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut writer = BlockWriter::default();
    for block in blocks {
        writer.block(block);
    }
    writer.finish()
}

struct OpenList {
    tag: &'static str,
    level: usize,
    /// An `<li>` at this level has not been closed yet.
    item_open: bool,
}

#[derive(Default)]
struct BlockWriter {
    lines: Vec<String>,
    lists: Vec<OpenList>,
}

impl BlockWriter {
    fn block(&mut self, block: &Block) {
        match block {
            Block::Paragraph(p) => self.paragraph(p),
            Block::Table(t) => {
                self.close_lists(0);
                let html = render_table(t);
                self.lines.push(html);
            }
        }
    }

    fn paragraph(&mut self, p: &Paragraph) {
        if p.is_empty() {
            return;
        }
        let mapped = p.effective_style().and_then(lookup_style);
        let content = render_inlines(&p.inlines);

        match (&p.list, mapped) {
            (Some(list), target) if target.is_none_or(|t| t.tag == "p") => {
                let tag = if list.ordered { "ol" } else { "ul" };
                self.list_item(tag, list.level, content);
            }
            (_, Some(target)) => {
                self.close_lists(0);
                self.lines.push(format!(
                    "<{tag} class=\"{class}\">{content}</{tag}>",
                    tag = target.tag,
                    class = target.class
                ));
            }
            (_, None) => {
                self.close_lists(0);
                self.lines.push(format!("<p>{content}</p>"));
            }
        }
    }

    fn list_item(&mut self, tag: &'static str, level: usize, content: String) {
        // Close deeper lists, and a same-level list of the other kind.
        while let Some(top) = self.lists.last() {
            if top.level > level || (top.level == level && top.tag != tag) {
                self.pop_list();
            } else {
                break;
            }
        }

        match self.lists.last_mut() {
            Some(top) if top.level == level => {
                if top.item_open {
                    self.lines.push("</li>".to_string());
                }
            }
            _ => {
                self.lines.push(format!("<{tag}>"));
                self.lists.push(OpenList {
                    tag,
                    level,
                    item_open: false,
                });
            }
        }

        self.lines.push(format!("<li>{content}"));
        if let Some(top) = self.lists.last_mut() {
            top.item_open = true;
        }
    }

    fn pop_list(&mut self) {
        if let Some(list) = self.lists.pop() {
            if list.item_open {
                self.lines.push("</li>".to_string());
            }
            self.lines.push(format!("</{}>", list.tag));
        }
    }

    /// Close open lists until at most `keep` remain.
    fn close_lists(&mut self, keep: usize) {
        while self.lists.len() > keep {
            self.pop_list();
        }
    }

    fn finish(mut self) -> String {
        self.close_lists(0);
        self.lines.join("\n")
    }
}

fn render_inlines(inlines: &[Inline]) -> String {
    let mut html = String::new();
    for inline in inlines {
        match inline {
            Inline::Text { text, bold, italic } => {
                let mut piece = escape_html(text);
                if *italic {
                    piece = format!("<em>{piece}</em>");
                }
                if *bold {
                    piece = format!("<strong>{piece}</strong>");
                }
                html.push_str(&piece);
            }
            Inline::Break => html.push_str("<br />"),
        }
    }
    html
}

fn render_table(table: &Table) -> String {
    let mut html = String::from("<table>");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&render_blocks(cell).replace('\n', ""));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}
