//! Pipeline stages for document-to-HTML normalisation.
//!
//! Two independent paths share only the escaping and container helpers in
//! [`html`]:
//!
//! ## Data Flow
//!
//! ```text
//! .pdf/.txt ──▶ input ──▶ classify ──▶ flat ──────────────────────▶ <div class="pdf-content">
//! .docx     ──▶ input ──▶ docx ──▶ structured ──▶ references ────▶ <div class="docx-content">
//! ```
//!
//! 1. [`input`]:      read the file once, tag its format, extract PDF text
//! 2. [`classify`]:   one line of text → heading / list item / table row /
//!    paragraph / blank
//! 3. [`flat`]:       classified lines → HTML, buffering table rows
//! 4. [`docx`]:       OOXML parts → paragraph/style/table stream
//! 5. [`structured`]: style map → HTML, native lists and tables
//! 6. [`references`]: move the references section to the end

pub mod classify;
pub mod docx;
pub mod flat;
pub mod html;
pub mod input;
pub mod references;
pub mod structured;
