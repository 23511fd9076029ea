//! Structural role of a single line of flat text.
//!
//! A PDF text extract has no document model, only lines. [`classify_line`]
//! guesses each line's role from its shape alone. It is pure and total:
//! every input gets exactly one role and nothing here can fail, so the
//! heuristics can be tuned without touching the builder's state machine.
//!
//! Precedence: blank, table row, heading, list item, paragraph.

use once_cell::sync::Lazy;
use regex::Regex;

/// Heading level given to every heuristically detected heading.
pub const FLAT_HEADING_LEVEL: u8 = 3;

/// Longest line that may still be a heading.
const MAX_HEADING_CHARS: usize = 100;
/// A line ending with `:` is a heading only if shorter than this.
const MAX_COLON_HEADING_CHARS: usize = 50;
/// An all-caps line must be longer than this to count as a heading.
const MIN_CAPS_HEADING_CHARS: usize = 3;

/// Column separator: a tab run (with any surrounding blanks) or 3+ blanks.
static RE_COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\t\s*|\s{3,}").unwrap());

/// Numbered section heading such as `1.1 Introduction` or `2. Methods`.
static RE_NUMBERED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d*\s+\p{Lu}").unwrap());

/// List marker: `1.` or a bullet glyph.
static RE_LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\d+\.|[•\-*])").unwrap());

/// Role of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRole {
    Heading { level: u8 },
    ListItem,
    TableRow { cells: Vec<String> },
    Paragraph,
    Blank,
}

/// A line together with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub raw_text: String,
    pub role: LineRole,
}

impl ClassifiedLine {
    /// Trim `line` and classify it.
    pub fn new(line: &str) -> Self {
        let raw_text = line.trim().to_string();
        let role = classify_line(&raw_text);
        Self { raw_text, role }
    }
}

/// Classify one already-trimmed line.
pub fn classify_line(line: &str) -> LineRole {
    if line.is_empty() {
        return LineRole::Blank;
    }
    if let Some(cells) = split_cells(line) {
        return LineRole::TableRow { cells };
    }
    if is_heading(line) {
        return LineRole::Heading {
            level: FLAT_HEADING_LEVEL,
        };
    }
    if RE_LIST_MARKER.is_match(line) {
        return LineRole::ListItem;
    }
    LineRole::Paragraph
}

/// Split a line into table cells, or `None` if it has fewer than two.
pub fn split_cells(line: &str) -> Option<Vec<String>> {
    if !RE_COLUMN_GAP.is_match(line) {
        return None;
    }
    let cells: Vec<String> = RE_COLUMN_GAP
        .split(line)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();
    (cells.len() >= 2).then_some(cells)
}

fn is_heading(line: &str) -> bool {
    let len = line.chars().count();
    if len > MAX_HEADING_CHARS {
        return false;
    }
    if len > MIN_CAPS_HEADING_CHARS && is_all_caps(line) {
        return true;
    }
    if line.ends_with(':') && len < MAX_COLON_HEADING_CHARS {
        return true;
    }
    RE_NUMBERED_HEADING.is_match(line)
}

/// At least one letter, and no lower-case letters.
fn is_all_caps(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading() -> LineRole {
        LineRole::Heading {
            level: FLAT_HEADING_LEVEL,
        }
    }

    #[test]
    fn blank() {
        assert_eq!(classify_line(""), LineRole::Blank);
    }

    #[test]
    fn caps_heading() {
        assert_eq!(classify_line("INTRODUCTION"), heading());
        assert_eq!(classify_line("GLOMERULAR DISEASE 2"), heading());
        // Too short.
        assert_eq!(classify_line("ABC"), LineRole::Paragraph);
        // Digits alone have no case.
        assert_eq!(classify_line("2024"), LineRole::Paragraph);
    }

    #[test]
    fn colon_heading() {
        assert_eq!(classify_line("Key features:"), heading());
        let long = format!("{}:", "word ".repeat(12));
        assert_eq!(classify_line(long.trim()), LineRole::Paragraph);
    }

    #[test]
    fn numbered_heading() {
        assert_eq!(classify_line("1.1 Introduction"), heading());
        assert_eq!(classify_line("2. Methods"), heading());
        assert_eq!(classify_line("12.3 Épidémiologie"), heading());
    }

    #[test]
    fn overlong_line_never_heading() {
        let line = "A".repeat(101);
        assert_eq!(classify_line(&line), LineRole::Paragraph);
    }

    #[test]
    fn list_items() {
        assert_eq!(classify_line("1. lower-case item"), LineRole::ListItem);
        assert_eq!(classify_line("• bullet"), LineRole::ListItem);
        assert_eq!(classify_line("- dash"), LineRole::ListItem);
        assert_eq!(classify_line("* star"), LineRole::ListItem);
    }

    #[test]
    fn table_rows() {
        assert_eq!(
            classify_line("Marker\tPositive\tNegative"),
            LineRole::TableRow {
                cells: vec!["Marker".into(), "Positive".into(), "Negative".into()]
            }
        );
        assert_eq!(
            classify_line("CK7   +   -"),
            LineRole::TableRow {
                cells: vec!["CK7".into(), "+".into(), "-".into()]
            }
        );
        // Mixed tab/space gap is one separator, not an empty cell.
        assert_eq!(
            split_cells("a\t   \tb"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn table_beats_heading() {
        assert!(matches!(
            classify_line("NAME     VALUE"),
            LineRole::TableRow { .. }
        ));
    }

    #[test]
    fn two_spaces_is_prose() {
        assert_eq!(classify_line("Two  spaces here"), LineRole::Paragraph);
    }

    #[test]
    fn classified_line_trims() {
        let l = ClassifiedLine::new("   Summary:  ");
        assert_eq!(l.raw_text, "Summary:");
        assert_eq!(l.role, heading());
    }

    #[test]
    fn odd_input_falls_back_to_paragraph() {
        for s in ["<script>", "\u{200B}", "&&&", "…", "—"] {
            assert_eq!(classify_line(s), LineRole::Paragraph, "input: {s:?}");
        }
        // A bare marker with nothing after it is still a list item.
        assert_eq!(classify_line("1."), LineRole::ListItem);
        assert_eq!(classify_line("•"), LineRole::ListItem);
    }
}
