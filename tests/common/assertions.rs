//! Custom assertions for redaction testing.
//!
//! Output is checked through its content streams rather than extracted text:
//! covers and replacements are drawn on top of the original page, so the
//! original glyphs stay in the stream underneath.

use super::pdf_helpers::{content_contains, is_valid_pdf, page_count};
use phi_redactor::RedactionLog;

/// Asserts that `replacement` was drawn somewhere in the document.
///
/// # Panics
/// Panics if no page content stream carries the string.
pub fn assert_replacement_drawn(pdf: &[u8], replacement: &str) {
    let found = content_contains(pdf, replacement).expect("Failed to read PDF content");
    assert!(
        found,
        "Replacement '{}' should be drawn but no content stream contains it",
        replacement
    );
}

/// Asserts that `text` appears nowhere in the document's content streams.
pub fn assert_not_drawn(pdf: &[u8], text: &str) {
    let found = content_contains(pdf, text).expect("Failed to read PDF content");
    assert!(!found, "'{}' should not be drawn but was found", text);
}

/// Asserts the bytes load as a PDF with the expected number of pages.
///
/// # Panics
/// Panics if the document does not load or the page count differs.
pub fn assert_valid_pdf(pdf: &[u8], expected_pages: usize) {
    assert!(!pdf.is_empty(), "PDF should not be empty");
    assert!(is_valid_pdf(pdf), "PDF should load with lopdf");
    let pages = page_count(pdf).expect("Failed to count pages");
    assert_eq!(
        pages, expected_pages,
        "expected {} page(s), found {}",
        expected_pages, pages
    );
}

/// Asserts the per-type counts cover drawn and unresolved spans exactly.
pub fn assert_log_balanced(log: &RedactionLog) {
    let sum: usize = log.metrics.type_counts.values().sum();
    assert_eq!(
        sum,
        log.metrics.total_redactions + log.metrics.unresolved_locations,
        "type_counts should sum to total_redactions plus unresolved"
    );
    assert_eq!(log.redactions.len(), sum);
    assert_eq!(log.metrics.unique_pii_types, log.metrics.type_counts.len());
}

/// Asserts the log holds exactly one entry of `pii_type` and returns it.
pub fn assert_single_entry<'a>(log: &'a RedactionLog, pii_type: &str) -> &'a phi_redactor::redaction::LogEntry {
    let entries: Vec<_> = log.redactions.iter().filter(|e| e.pii_type == pii_type).collect();
    assert_eq!(
        entries.len(),
        1,
        "expected one '{}' entry, found {}",
        pii_type,
        entries.len()
    );
    entries[0]
}
