//! Document parser built on MuPDF structured text.

use super::{check_header, quad_bbox, rect_bbox, with_mupdf};
use crate::domain::{DocumentElement, PageInfo, ParsedDocument};
use crate::error::{RedactorError, RedactorResult};
use mupdf::{Document, TextBlockType, TextPageOptions};
use tracing::{debug, instrument};

/// Parses PDF bytes into page geometry plus text and image elements.
///
/// One text element is produced per structured-text line, carrying a glyph
/// box for every character. Image blocks become image elements. Any failure
/// to open the document or read a page is fatal.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn parse(bytes: &[u8]) -> RedactorResult<ParsedDocument> {
    check_header(bytes)?;
    with_mupdf(|| parse_locked(bytes))
}

fn parse_locked(bytes: &[u8]) -> RedactorResult<ParsedDocument> {
    let document = Document::from_bytes(bytes, "pdf")
        .map_err(|e| RedactorError::parse("failed to open PDF", Some(Box::new(e))))?;

    let locked = document
        .needs_password()
        .map_err(|e| RedactorError::parse("failed to inspect encryption", Some(Box::new(e))))?;
    if locked {
        return Err(RedactorError::parse("document is password protected", None));
    }

    let page_count = document
        .page_count()
        .map_err(|e| RedactorError::parse("failed to count pages", Some(Box::new(e))))?;

    let mut parsed = ParsedDocument::default();
    for index in 0..page_count {
        let page_index = index as usize;
        let page_error = |message: &str, e: mupdf::Error| RedactorError::Parse {
            message: message.to_string(),
            page: Some(page_index + 1),
            source: Some(Box::new(e)),
        };

        let page = document
            .load_page(index)
            .map_err(|e| page_error("failed to load page", e))?;
        let bounds = page
            .bounds()
            .map_err(|e| page_error("failed to read page bounds", e))?;
        parsed.pages.push(PageInfo {
            index: page_index,
            width: bounds.x1 - bounds.x0,
            height: bounds.y1 - bounds.y0,
        });

        let text_page = page
            .to_text_page(TextPageOptions::PRESERVE_IMAGES)
            .map_err(|e| page_error("failed to extract text", e))?;

        for (block_index, block) in text_page.blocks().enumerate() {
            let kind = block.r#type();
            if matches!(kind, TextBlockType::Image) {
                let bbox = rect_bbox(&block.bounds());
                if !bbox.is_empty() {
                    parsed.elements.push(DocumentElement::image(
                        page_index,
                        bbox,
                        format!("image:p{}:b{}", page_index, block_index),
                    ));
                }
                continue;
            }
            if !matches!(kind, TextBlockType::Text) {
                continue;
            }

            for line in block.lines() {
                let mut content = String::new();
                let mut glyphs = Vec::new();
                let mut sizes = Vec::new();
                for ch in line.chars() {
                    content.push(ch.char().unwrap_or(char::REPLACEMENT_CHARACTER));
                    glyphs.push(quad_bbox(&ch.quad()));
                    sizes.push(ch.size());
                }
                if content.trim().is_empty() {
                    continue;
                }

                let bbox = rect_bbox(&line.bounds());
                let font_size = dominant_size(&sizes).unwrap_or_else(|| bbox.height());
                parsed.elements.push(
                    DocumentElement::text(page_index, bbox, content, font_size).with_glyphs(glyphs),
                );
            }
        }
    }

    debug!(
        pages = parsed.page_count(),
        elements = parsed.elements.len(),
        "parsed document"
    );
    Ok(parsed)
}

/// Most common glyph size, rounded to a tenth of a point.
fn dominant_size(sizes: &[f32]) -> Option<f32> {
    let mut counts: Vec<(i32, usize)> = Vec::new();
    for size in sizes.iter().filter(|s| s.is_finite() && **s > 0.0) {
        let key = (size * 10.0).round() as i32;
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key, 1)),
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(key, _)| key as f32 / 10.0)
}
