//! Coordinate mapping: attaches a page-space box to every span.
//!
//! Spans whose source element carries glyph boxes are placed from those
//! boxes directly. The rest are found by searching the reference layout:
//! the Nth case-insensitive occurrence of the span text on its page, counted
//! over the page's element texts in order, is taken to be the Nth search
//! hit. Spans that cannot be placed are flagged, logged and left undrawn.

use super::{quad_bbox, with_mupdf};
use crate::domain::{BBox, ParsedDocument, PiiSpan};
use crate::error::{RedactorError, RedactorResult};
use mupdf::Document;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

/// Counts from one mapping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingReport {
    pub from_glyphs: usize,
    pub from_search: usize,
    pub unresolved: usize,
}

#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    max_hits: u32,
}

impl Default for CoordinateMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self { max_hits: 500 }
    }

    /// Caps search hits per needle and page.
    pub fn with_max_hits(mut self, max_hits: u32) -> Self {
        self.max_hits = max_hits.max(1);
        self
    }

    /// Sets `bbox` or `location_unresolved` on every span.
    ///
    /// `layout` is the reference layout; when it is `None` spans without
    /// glyph boxes are unresolved. Never fails: search errors only make the
    /// affected spans unresolved.
    #[instrument(skip_all, fields(spans = spans.len()))]
    pub fn map(
        &self,
        document: &ParsedDocument,
        spans: &mut [PiiSpan],
        layout: Option<&[u8]>,
    ) -> MappingReport {
        let mut report = MappingReport::default();
        let mut pending: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for (i, span) in spans.iter_mut().enumerate() {
            let glyph_box = document
                .elements
                .get(span.element_index)
                .and_then(|e| e.glyph_span(&span.range));
            match glyph_box {
                Some(bbox) => {
                    span.bbox = Some(bbox);
                    report.from_glyphs += 1;
                }
                None => pending.entry(span.page_index).or_default().push(i),
            }
        }

        if !pending.is_empty() {
            let located = match layout {
                Some(bytes) => self.search_layout(document, spans, &pending, bytes),
                None => Ok(HashMap::new()),
            };
            let located = located.unwrap_or_else(|e| {
                warn!(error = %e, "reference layout search failed");
                HashMap::new()
            });

            for index in pending.values().flatten() {
                let span = &mut spans[*index];
                match located.get(index) {
                    Some(bbox) => {
                        span.bbox = Some(*bbox);
                        report.from_search += 1;
                    }
                    None => {
                        warn!(
                            pii_type = %span.pii_type,
                            page = span.page_index + 1,
                            "could not locate span, leaving it unredacted on the page"
                        );
                        span.location_unresolved = true;
                        report.unresolved += 1;
                    }
                }
            }
        }

        debug!(?report, "mapping finished");
        report
    }

    /// Resolves pending spans against the layout; returns span index to box.
    fn search_layout(
        &self,
        document: &ParsedDocument,
        spans: &[PiiSpan],
        pending: &BTreeMap<usize, Vec<usize>>,
        layout: &[u8],
    ) -> RedactorResult<HashMap<usize, BBox>> {
        with_mupdf(|| -> RedactorResult<HashMap<usize, BBox>> {
            let reference = Document::from_bytes(layout, "pdf").map_err(|e| {
                RedactorError::backend("MuPDF", "failed to open reference layout", Some(Box::new(e)))
            })?;

            let mut located = HashMap::new();
            for (page_index, indices) in pending {
                let page_elements: Vec<usize> = document
                    .text_elements()
                    .filter(|(_, e)| e.page_index == *page_index)
                    .map(|(i, _)| i)
                    .collect();
                let texts: Vec<&str> = page_elements
                    .iter()
                    .map(|i| document.elements[*i].content.as_str())
                    .collect();

                let page = match reference.load_page(*page_index as i32) {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(page = page_index + 1, error = %e, "reference page unavailable");
                        continue;
                    }
                };

                let mut hits_by_needle: HashMap<String, Vec<BBox>> = HashMap::new();
                for index in indices {
                    let span = &spans[*index];
                    let Some(position) = page_elements.iter().position(|i| *i == span.element_index) else {
                        continue;
                    };
                    let Some(nth) = occurrence_index(&texts, position, span.range.start, &span.original_text) else {
                        continue;
                    };

                    let needle = span.original_text.to_ascii_lowercase();
                    if !hits_by_needle.contains_key(&needle) {
                        let hits = match page.search(&span.original_text, self.max_hits) {
                            Ok(quads) => quads.iter().map(quad_bbox).collect(),
                            Err(e) => {
                                warn!(page = page_index + 1, error = %e, "layout search failed");
                                Vec::new()
                            }
                        };
                        hits_by_needle.insert(needle.clone(), hits);
                    }

                    if let Some(bbox) = hits_by_needle[&needle].get(nth) {
                        located.insert(*index, *bbox);
                    }
                }
            }
            Ok(located)
        })
    }
}

/// Which occurrence of `needle` a span is on its page.
///
/// `texts` are the page's element texts in order, `position` the span's
/// element among them and `start` its byte offset inside that element.
/// Occurrences are matched case-insensitively and without overlap over the
/// texts joined by newlines; the result counts those starting before the
/// span.
pub fn occurrence_index(texts: &[&str], position: usize, start: usize, needle: &str) -> Option<usize> {
    if needle.is_empty() || position >= texts.len() {
        return None;
    }
    let offset: usize = texts[..position].iter().map(|t| t.len() + 1).sum::<usize>() + start;

    let haystack = texts.join("\n").to_ascii_lowercase();
    let needle = needle.to_ascii_lowercase();
    Some(
        haystack
            .match_indices(needle.as_str())
            .take_while(|(i, _)| *i < offset)
            .count(),
    )
}
