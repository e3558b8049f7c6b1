//! Audit overlay: the original document with every redacted region
//! highlighted and tagged. Never distributed in place of the redacted copy.

use super::canvas::{self, PageCanvas, Rgb};
use crate::config::{Action, VisualRedactionMode};
use crate::domain::{BBox, DocumentElement, PiiSpan};
use crate::error::RedactorResult;
use lopdf::{dictionary, Document, Object, StringFormat};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

const HIGHLIGHT_ALPHA: f32 = 0.35;
const TAG_SIZE: f32 = 6.0;

/// Highlight colour for a span's effective action.
pub fn action_color(action: Action) -> Rgb {
    match action {
        Action::DummyReplacement => Rgb(0.0, 0.6, 0.0),
        Action::Rewrite => Rgb(0.0, 0.3, 0.9),
        Action::Encrypt => Rgb(0.5, 0.0, 0.6),
        Action::Anonymize => Rgb(0.9, 0.0, 0.0),
    }
}

/// Highlight colour for image elements.
pub const VISUAL_COLOR: Rgb = Rgb(1.0, 0.55, 0.0);

struct Mark<'a> {
    bbox: BBox,
    color: Rgb,
    tag: String,
    note: Option<&'a str>,
}

/// Builds the overlay PDF from the original bytes.
#[derive(Debug, Clone, Default)]
pub struct OverlayBuilder;

impl OverlayBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Draws a translucent highlight, a `type - action` tag and a Highlight
    /// annotation for every applied span and every image element.
    #[instrument(skip_all, fields(spans = spans.len(), images = images.len()))]
    pub fn build(
        &self,
        original: &[u8],
        spans: &[PiiSpan],
        images: &[DocumentElement],
        mode: VisualRedactionMode,
    ) -> RedactorResult<Vec<u8>> {
        let mut by_page: BTreeMap<usize, Vec<Mark<'_>>> = BTreeMap::new();
        for span in spans.iter().filter(|s| s.is_applied()) {
            let Some(bbox) = span.bbox else { continue };
            by_page.entry(span.page_index).or_default().push(Mark {
                bbox,
                color: action_color(span.action),
                tag: format!("{} - {}", span.pii_type, span.action),
                note: span.replacement(),
            });
        }
        let visual_tag = match mode {
            VisualRedactionMode::Textbox => "Visual Element - textbox",
            VisualRedactionMode::Replacement => "Visual Element - replacement",
        };
        for image in images {
            by_page.entry(image.page_index).or_default().push(Mark {
                bbox: image.bbox,
                color: VISUAL_COLOR,
                tag: visual_tag.to_string(),
                note: image.label.as_deref(),
            });
        }

        if by_page.is_empty() {
            return Ok(original.to_vec());
        }

        let mut doc = Document::load_mem(original)?;
        let pages = doc.get_pages();

        for (page_index, marks) in by_page {
            let Some(&page_id) = pages.get(&(page_index as u32 + 1)) else {
                warn!(page = page_index + 1, "page missing from overlay document, skipping");
                continue;
            };
            let geometry = canvas::page_geometry(&doc, page_id);
            let font = canvas::register_resource(&mut doc, page_id, "Font", "FOvl", canvas::helvetica())?;
            let alpha = canvas::register_resource(
                &mut doc,
                page_id,
                "ExtGState",
                "GOvl",
                canvas::translucent(HIGHLIGHT_ALPHA),
            )?;

            let mut page = PageCanvas::new();
            page.transform(geometry.display_matrix());
            for mark in &marks {
                let rect = geometry.to_display_space(&mark.bbox);
                page.save_state();
                page.set_graphics_state(&alpha);
                page.fill_rect(rect, mark.color);
                page.restore_state();

                let (x, y, _, h) = rect;
                page.text(&font, TAG_SIZE, x, y + h + 1.5, mark.color, &mark.tag);

                // Annotation rectangles are not affected by the content matrix.
                let contents = match mark.note {
                    Some(note) => format!("{}: {}", mark.tag, note),
                    None => mark.tag.clone(),
                };
                let annotation = highlight(geometry.to_user_space(&mark.bbox), mark.color, &contents);
                canvas::add_annotation(&mut doc, page_id, annotation)?;
            }
            page.flush(&mut doc, page_id)?;
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        debug!(bytes = out.len(), "overlay built");
        Ok(out)
    }
}

fn highlight(rect: (f32, f32, f32, f32), color: Rgb, contents: &str) -> lopdf::Dictionary {
    let (x, y, w, h) = rect;
    let numbers = |values: &[f32]| Object::Array(values.iter().map(|v| (*v).into()).collect());
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => numbers(&[x, y, x + w, y + h]),
        "QuadPoints" => numbers(&[x, y + h, x + w, y + h, x, y, x + w, y]),
        "C" => numbers(&[color.0, color.1, color.2]),
        "CA" => HIGHLIGHT_ALPHA,
        "F" => 4i64,
        "T" => Object::String(b"phi-redactor".to_vec(), StringFormat::Literal),
        "Contents" => Object::String(canvas::encode_win_ansi(contents), StringFormat::Literal),
    }
}
