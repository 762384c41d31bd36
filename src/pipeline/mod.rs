//! Pipeline stages for passage extraction.
//!
//! Each submodule implements exactly one step, so every stage can be tested
//! on literal strings without a PDF on disk.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ cleanup ──▶ structured | mini ──▶ ExtractionResult
//! (URL/path) (pdfium)  (normalise)   (classify lines)
//! ```
//!
//! 1. [`input`]: canonicalise the path or URL, sniff PDF vs text
//! 2. [`text`]: pdfium text layer, pages joined with form feeds
//! 3. [`cleanup`]: line endings, invisible characters, passage cleanup
//! 4. [`classify`]: Korean / English / source marker / separator per line
//! 5. [`structured`] and [`mini`]: the two layout parsers

pub mod classify;
pub mod cleanup;
pub mod input;
pub mod mini;
pub mod structured;
pub mod text;
