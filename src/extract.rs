//! PDF plain-text extraction.
//!
//! Thin contract over `pdf-extract`: a byte stream of a PDF in, plain text
//! out. Layout-aware parsing is out of scope.

use crate::error::{Result, ScholarError};
use std::path::Path;

/// Extract plain text from PDF bytes.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ScholarError::Parse(format!("PDF text extraction failed: {}", e)))
}

/// Read a PDF file and extract its plain text.
pub fn pdf_file_to_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    pdf_to_text(&bytes)
}
