//! Document text extraction
//!
//! Dispatches on the file extension: plain text and JSON are decoded
//! directly (JSON is pretty-printed), HTML gets the same cleanup as scraped
//! pages, PDF text is pulled out with lopdf, and anything else is decoded
//! as UTF-8 on a best-effort basis.

use crate::html::clean_html;
use agentdesk_common::errors::{AppError, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Lowercased extension of a file name, if it has one
pub fn file_type(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Extract the text of an uploaded document
pub fn extract_text(file_name: &str, bytes: &[u8]) -> Result<String> {
    let text = match file_type(file_name).as_deref() {
        Some("txt") => String::from_utf8_lossy(bytes).into_owned(),
        Some("json") => {
            let value: serde_json::Value =
                serde_json::from_slice(bytes).map_err(|e| AppError::Extraction {
                    message: format!("Failed to process file content: {}", e),
                })?;
            serde_json::to_string_pretty(&value)?
        }
        Some("html") | Some("htm") => clean_html(&String::from_utf8_lossy(bytes)),
        Some("pdf") => extract_pdf_text(bytes)?,
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    debug!(file_name, bytes = bytes.len(), chars = text.len(), "Document text extracted");
    Ok(text)
}

/// Extract text content from an in-memory PDF
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::Extraction {
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(page_text.trim());
                text.push_str("\n\n");
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(AppError::Extraction {
            message: "No text content extracted from PDF".to_string(),
        });
    }

    Ok(text.trim().to_string())
}
