//! Small HTML helpers shared by both builders.
//!
//! Converted output is injected into the viewer as raw HTML and never
//! sanitised again, so every text node goes through [`escape_html`] exactly
//! once, at the point where it is emitted.

/// CSS class on the container wrapping flat-text output.
pub const FLAT_CONTAINER_CLASS: &str = "pdf-content";

/// CSS class on the container wrapping structured-document output.
pub const STRUCTURED_CONTAINER_CLASS: &str = "docx-content";

/// Escape `& < > " '` for use in text nodes and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Wrap already-built markup in the single top-level container.
pub fn wrap_container(class: &str, inner: &str) -> String {
    format!("<div class=\"{class}\">\n{inner}\n</div>")
}
