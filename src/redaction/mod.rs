//! Redaction output: the redacted document, the audit overlay and the log.
//!
//! Drawing is additive. Each affected page keeps its original content
//! streams untouched and gains a stream that covers every redacted region
//! and draws the replacement on top.

pub mod canvas;
pub mod log;
pub mod overlay;

pub use log::{LogEntry, LogMetrics, RedactionLog};
pub use overlay::OverlayBuilder;

use crate::config::VisualRedactionMode;
use crate::domain::{DocumentElement, PiiSpan};
use crate::error::{RedactorError, RedactorResult};
use canvas::{PageCanvas, Rgb};
use lopdf::{Document, ObjectId};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

/// Label drawn on image boxes in textbox mode.
pub const IMAGE_LABEL: &str = "Redacted Image";

const IMAGE_COVER: Rgb = Rgb(0.85, 0.85, 0.85);

/// Counts from one stamping run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionSummary {
    /// Text spans drawn
    pub spans_applied: usize,
    /// Image elements covered
    pub images_covered: usize,
    /// Pages that received a new stream
    pub pages_modified: usize,
}

impl RedactionSummary {
    /// True if anything was drawn.
    pub fn has_redactions(&self) -> bool {
        self.spans_applied + self.images_covered > 0
    }
}

/// A stamped document waiting to be encoded.
pub struct StampedDocument {
    document: Option<Document>,
    pub summary: RedactionSummary,
}

impl StampedDocument {
    /// True when there was nothing to draw and the input is returned as-is.
    pub fn is_unchanged(&self) -> bool {
        self.document.is_none()
    }
}

/// Applies positioned replacements and image covers to a PDF.
#[derive(Debug, Clone, Default)]
pub struct RedactionEngine;

impl RedactionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Redacts `original` in one step.
    ///
    /// # Arguments
    /// * `original` - Source PDF bytes
    /// * `spans` - Spans with replacements and locations; unplaced spans are skipped
    /// * `images` - Image elements to cover
    /// * `mode` - How images are covered
    ///
    /// # Returns
    /// The redacted PDF bytes; the input bytes unchanged if there is nothing
    /// to draw.
    pub fn apply(
        &self,
        original: &[u8],
        spans: &[PiiSpan],
        images: &[DocumentElement],
        mode: VisualRedactionMode,
    ) -> RedactorResult<Vec<u8>> {
        let stamped = self.stamp(original, spans, images, mode)?;
        self.encode(original, stamped)
    }

    /// Draws covers and replacements into a copy of the document.
    #[instrument(skip_all, fields(spans = spans.len(), images = images.len()))]
    pub fn stamp(
        &self,
        original: &[u8],
        spans: &[PiiSpan],
        images: &[DocumentElement],
        mode: VisualRedactionMode,
    ) -> RedactorResult<StampedDocument> {
        let applied: Vec<&PiiSpan> = spans.iter().filter(|s| s.is_applied()).collect();
        if applied.is_empty() && images.is_empty() {
            return Ok(StampedDocument {
                document: None,
                summary: RedactionSummary::default(),
            });
        }

        let mut doc = Document::load_mem(original)?;
        let pages = doc.get_pages();

        let mut by_page: BTreeMap<usize, (Vec<&PiiSpan>, Vec<&DocumentElement>)> = BTreeMap::new();
        for span in applied {
            by_page.entry(span.page_index).or_default().0.push(span);
        }
        for image in images {
            by_page.entry(image.page_index).or_default().1.push(image);
        }

        let mut summary = RedactionSummary::default();
        for (page_index, (page_spans, page_images)) in by_page {
            let Some(&page_id) = pages.get(&(page_index as u32 + 1)) else {
                warn!(page = page_index + 1, "page missing from output document, skipping");
                continue;
            };
            self.stamp_page(&mut doc, page_id, &page_spans, &page_images, mode)
                .map_err(|e| with_page(e, page_index))?;

            summary.spans_applied += page_spans.len();
            summary.images_covered += page_images.len();
            summary.pages_modified += 1;
        }

        debug!(?summary, "stamped document");
        Ok(StampedDocument {
            document: Some(doc),
            summary,
        })
    }

    /// Serializes a stamped document.
    pub fn encode(&self, original: &[u8], stamped: StampedDocument) -> RedactorResult<Vec<u8>> {
        match stamped.document {
            None => Ok(original.to_vec()),
            Some(mut doc) => {
                let mut out = Vec::new();
                doc.save_to(&mut out).map_err(|e| {
                    RedactorError::redaction("failed to encode redacted PDF", Some(Box::new(e)))
                })?;
                Ok(out)
            }
        }
    }

    fn stamp_page(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        spans: &[&PiiSpan],
        images: &[&DocumentElement],
        mode: VisualRedactionMode,
    ) -> RedactorResult<()> {
        let geometry = canvas::page_geometry(doc, page_id);
        let font = canvas::register_resource(doc, page_id, "Font", "FRdx", canvas::helvetica())?;
        let placeholder = match (mode, images.is_empty()) {
            (VisualRedactionMode::Replacement, false) => Some(canvas::register_resource(
                doc,
                page_id,
                "XObject",
                "IRdx",
                canvas::placeholder_image(),
            )?),
            _ => None,
        };

        let mut page = PageCanvas::new();
        page.transform(geometry.display_matrix());

        for image in images {
            let rect = geometry.to_display_space(&image.bbox);
            match &placeholder {
                Some(name) => {
                    page.fill_rect(rect, IMAGE_COVER);
                    page.image(name, rect);
                }
                None => {
                    page.fill_rect(rect, Rgb::BLACK);
                    let (x, y, w, h) = rect;
                    let label = image_label(image);
                    let fit = canvas::fit_text(label, (h * 0.6).min(12.0), w, h);
                    page.save_state();
                    page.clip_rect(rect);
                    page.fitted_text(
                        &font,
                        fit,
                        x + ((w - fit.drawn_width(label)) / 2.0).max(0.0),
                        y + ((h - fit.size) / 2.0).max(0.0) + fit.size * 0.22,
                        Rgb::WHITE,
                        label,
                    );
                    page.restore_state();
                }
            }
        }

        for span in spans {
            let (Some(bbox), Some(replacement)) = (span.bbox, span.replacement()) else {
                continue;
            };
            let rect = geometry.to_display_space(&bbox);
            let (x, y, w, h) = rect;
            page.fill_rect(rect, Rgb::WHITE);

            // Replacement text never leaves its cover.
            let fit = canvas::fit_text(replacement, span.font_size, w, h);
            page.save_state();
            page.clip_rect(rect);
            page.fitted_text(
                &font,
                fit,
                x,
                y + ((h - fit.size) / 2.0).max(0.0) + fit.size * 0.22,
                Rgb::BLACK,
                replacement,
            );
            page.restore_state();
        }

        page.flush(doc, page_id)
    }
}

/// Label drawn on an image box: its class, or [`IMAGE_LABEL`].
pub fn image_label(image: &DocumentElement) -> &str {
    image.label.as_deref().unwrap_or(IMAGE_LABEL)
}

fn with_page(err: RedactorError, page_index: usize) -> RedactorError {
    match err {
        RedactorError::Redaction { message, source, .. } => RedactorError::Redaction {
            message,
            page: Some(page_index + 1),
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let summary = RedactionSummary::default();
        assert!(!summary.has_redactions());

        let summary = RedactionSummary {
            images_covered: 1,
            ..Default::default()
        };
        assert!(summary.has_redactions());
    }

    #[test]
    fn test_image_label_prefers_class() {
        use crate::domain::BBox;

        let image = DocumentElement::image(0, BBox::new(0.0, 0.0, 10.0, 10.0), "image:p0:b0");
        assert_eq!(image_label(&image), IMAGE_LABEL);
        assert_eq!(image_label(&image.with_label("Full Face Photo")), "Full Face Photo");
    }

    #[test]
    fn test_nothing_to_draw_returns_input() {
        let input = b"%PDF-1.4 not even parsed".to_vec();
        let out = RedactionEngine::new()
            .apply(&input, &[], &[], VisualRedactionMode::Textbox)
            .unwrap();
        assert_eq!(out, input);
    }
}
