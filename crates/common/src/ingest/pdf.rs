//! PDF text extraction
//!
//! Extracts text content from PDF bytes using lopdf.

use crate::errors::{AppError, Result};
use tracing::{debug, warn};

/// Extract the text of every page; `name` is only used in errors and logs
pub fn extract_text(bytes: &[u8], name: &str) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::UnsupportedDocument {
        message: format!("Failed to load PDF '{}': {}", name, e),
    })?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(document = name, page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page in &pages {
        match doc.extract_text(&[*page]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(document = name, page, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(AppError::UnsupportedDocument {
            message: format!("No text content extracted from '{}'", name),
        });
    }

    debug!(
        document = name,
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );

    Ok(cleaned)
}

/// Collapse whitespace runs and strip byte-order marks, keeping paragraph breaks
pub fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Whether a file name or content type denotes a PDF
pub fn is_pdf(file_name: &str, content_type: Option<&str>) -> bool {
    let by_name = file_name.to_ascii_lowercase().ends_with(".pdf");
    let by_type = content_type.map_or(false, |ct| ct.eq_ignore_ascii_case("application/pdf"));
    by_name || by_type
}
