//! Flat-text HTML builder: classified lines → semantic HTML.
//!
//! ## State machine
//!
//! ```text
//!            TableRow                     TableRow
//!   Prose ─────────────▶ AccumulatingTable ◀──────┐
//!     ▲                        │  └───────────────┘
//!     └──── any other role ────┘  (flush table, then handle the line)
//! ```
//!
//! Consecutive table-like lines are buffered and flushed as a single
//! `<table>` whose first row is rendered as header cells. End of input is
//! an explicit flush step, so a trailing table is never lost.

use crate::pipeline::classify::{ClassifiedLine, LineRole};
use crate::pipeline::html::{escape_html, wrap_container, FLAT_CONTAINER_CLASS};

const HEADING_CLASS: &str = "text-lg font-semibold mt-6 mb-3";
const LIST_ITEM_CLASS: &str = "ml-4 mb-2";
const PARAGRAPH_CLASS: &str = "mb-3";
const TABLE_WRAPPER_CLASS: &str = "overflow-x-auto my-4";
const TABLE_CLASS: &str = "min-w-full border-collapse";
const HEADER_ROW_CLASS: &str = "bg-muted";
const HEADER_CELL_CLASS: &str = "border border-border px-4 py-2 text-left font-semibold";
const BODY_CELL_CLASS: &str = "border border-border px-4 py-2";

enum BuildState {
    Prose,
    AccumulatingTable(Vec<Vec<String>>),
}

/// Incremental builder; feed lines with [`FlatHtmlBuilder::push_line`] and
/// call [`FlatHtmlBuilder::finish`] once.
pub struct FlatHtmlBuilder {
    out: String,
    state: BuildState,
}

impl Default for FlatHtmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatHtmlBuilder {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            state: BuildState::Prose,
        }
    }

    /// Classify and emit one raw line.
    pub fn push_line(&mut self, raw: &str) {
        self.push(ClassifiedLine::new(raw));
    }

    /// Emit one already-classified line.
    pub fn push(&mut self, line: ClassifiedLine) {
        let ClassifiedLine { raw_text, role } = line;
        let text = escape_html(&raw_text);

        let html = match role {
            LineRole::TableRow { cells } => {
                match &mut self.state {
                    BuildState::AccumulatingTable(rows) => rows.push(cells),
                    BuildState::Prose => self.state = BuildState::AccumulatingTable(vec![cells]),
                }
                return;
            }
            LineRole::Blank => "<br/>\n".to_string(),
            LineRole::Heading { level } => {
                let level = level.clamp(1, 6);
                format!("<h{level} class=\"{HEADING_CLASS}\">{text}</h{level}>\n")
            }
            LineRole::ListItem => format!("<p class=\"{LIST_ITEM_CLASS}\">{text}</p>\n"),
            LineRole::Paragraph => format!("<p class=\"{PARAGRAPH_CLASS}\">{text}</p>\n"),
        };

        self.flush_table();
        self.out.push_str(&html);
    }

    /// Flush any pending table and return the wrapped document.
    pub fn finish(mut self) -> String {
        self.flush_table();
        wrap_container(FLAT_CONTAINER_CLASS, self.out.trim_end())
    }

    fn flush_table(&mut self) {
        if let BuildState::AccumulatingTable(rows) =
            std::mem::replace(&mut self.state, BuildState::Prose)
        {
            self.out.push_str(&render_table(&rows));
        }
    }
}

/// Convert a whole flat-text extract to HTML.
pub fn flat_text_to_html(text: &str) -> String {
    lines_to_html(text.lines())
}

/// Convert a sequence of raw lines to HTML.
pub fn lines_to_html<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut builder = FlatHtmlBuilder::new();
    for line in lines {
        builder.push_line(line);
    }
    builder.finish()
}

fn render_table(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut html = format!(
        "<div class=\"{TABLE_WRAPPER_CLASS}\"><table class=\"{TABLE_CLASS}\">\n"
    );
    for (i, row) in rows.iter().enumerate() {
        let (tag, row_class, cell_class) = if i == 0 {
            ("th", HEADER_ROW_CLASS, HEADER_CELL_CLASS)
        } else {
            ("td", "", BODY_CELL_CLASS)
        };
        html.push_str(&format!("<tr class=\"{row_class}\">\n"));
        for cell in row {
            html.push_str(&format!(
                "<{tag} class=\"{cell_class}\">{}</{tag}>\n",
                escape_html(cell)
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table></div>\n");
    html
}
