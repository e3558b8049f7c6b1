//! PDF inspection helpers.

use anyhow::{anyhow, Result};
use lopdf::Document;
use std::path::Path;

/// Extracts the plain text of a PDF file.
pub fn extract_text(pdf_path: &Path) -> Result<String> {
    phi_redactor::extract_text_from_pdf(pdf_path).map_err(|e| anyhow!("Failed to extract text: {}", e))
}

/// Counts occurrences of a pattern in the extracted text.
pub fn count_pattern_in_pdf(pdf_path: &Path, pattern: &str) -> Result<usize> {
    Ok(extract_text(pdf_path)?.matches(pattern).count())
}

/// Decoded content streams of one page (1-based), concatenated.
pub fn page_content(bytes: &[u8], page_number: u32) -> Result<Vec<u8>> {
    let doc = Document::load_mem(bytes)?;
    let page_id = *doc
        .get_pages()
        .get(&page_number)
        .ok_or_else(|| anyhow!("page {} not found", page_number))?;
    Ok(doc.get_page_content(page_id)?)
}

/// True when any page's content streams contain `needle` verbatim.
pub fn content_contains(bytes: &[u8], needle: &str) -> Result<bool> {
    let doc = Document::load_mem(bytes)?;
    for page_id in doc.get_pages().into_values() {
        let content = doc.get_page_content(page_id)?;
        if content.windows(needle.len()).any(|w| w == needle.as_bytes()) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn page_count(bytes: &[u8]) -> Result<usize> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}

/// Number of annotations with the given subtype across all pages.
pub fn annotation_count(bytes: &[u8], subtype: &str) -> Result<usize> {
    let doc = Document::load_mem(bytes)?;
    let mut count = 0;
    for page_id in doc.get_pages().into_values() {
        let page = doc.get_dictionary(page_id)?;
        let annots = match page.get(b"Annots") {
            Ok(obj) => match obj.as_reference() {
                Ok(id) => doc.get_object(id)?.as_array()?.clone(),
                Err(_) => obj.as_array()?.clone(),
            },
            Err(_) => continue,
        };
        for annot in annots {
            let dict = match annot.as_reference() {
                Ok(id) => doc.get_dictionary(id)?,
                Err(_) => continue,
            };
            if dict.get(b"Subtype").and_then(|s| s.as_name()).ok() == Some(subtype.as_bytes()) {
                count += 1;
            }
        }
    }
    Ok(count)
}

pub fn is_valid_pdf(bytes: &[u8]) -> bool {
    Document::load_mem(bytes).is_ok()
}
