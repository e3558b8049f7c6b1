//! Reference layout: the extracted text re-rendered as a plain PDF.
//!
//! Each page has the size of the source page; each text element is drawn in
//! Helvetica at its own origin and font size. The mapper searches this
//! document when a span has no glyph boxes of its own.

use crate::domain::ParsedDocument;
use crate::error::{RedactorError, RedactorResult};
use printpdf::{BuiltinFont, Mm, PdfDocument, Pt};
use std::io::BufWriter;
use tracing::debug;

const FALLBACK_PAGE: (f32, f32) = (612.0, 792.0);

/// Renders the text elements of `document` into a new PDF.
pub fn render_reference_layout(document: &ParsedDocument) -> RedactorResult<Vec<u8>> {
    let page_size = |index: usize| {
        document
            .pages
            .get(index)
            .filter(|p| p.width > 0.0 && p.height > 0.0)
            .map(|p| (p.width, p.height))
            .unwrap_or(FALLBACK_PAGE)
    };

    let (first_w, first_h) = page_size(0);
    let (pdf, first_page, first_layer) = PdfDocument::new(
        "reference layout",
        Mm::from(Pt(first_w)),
        Mm::from(Pt(first_h)),
        "text",
    );
    let font = pdf
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| layout_error("failed to add font", e))?;

    let page_count = document.page_count().max(1);
    let mut layers = vec![(first_page, first_layer)];
    for index in 1..page_count {
        let (w, h) = page_size(index);
        layers.push(pdf.add_page(Mm::from(Pt(w)), Mm::from(Pt(h)), "text"));
    }

    for (_, element) in document.text_elements() {
        let Some(&(page, layer)) = layers.get(element.page_index) else {
            continue;
        };
        let (_, height) = page_size(element.page_index);
        let size = if element.font_size > 0.0 {
            element.font_size
        } else {
            element.bbox.height().max(1.0)
        };
        // Baseline sits roughly one font size below the top of the line box.
        let baseline = height - element.bbox.y0 - size * 0.8;

        pdf.get_page(page).get_layer(layer).use_text(
            element.content.as_str(),
            size,
            Mm::from(Pt(element.bbox.x0)),
            Mm::from(Pt(baseline)),
            &font,
        );
    }

    let mut writer = BufWriter::new(Vec::new());
    pdf.save(&mut writer)
        .map_err(|e| layout_error("failed to encode reference layout", e))?;
    let bytes = writer.into_inner().map_err(|e| {
        RedactorError::backend("printpdf", "failed to flush reference layout", Some(Box::new(e.into_error())))
    })?;

    debug!(pages = page_count, bytes = bytes.len(), "rendered reference layout");
    Ok(bytes)
}

fn layout_error(message: &str, e: printpdf::Error) -> RedactorError {
    RedactorError::backend("printpdf", format!("{}: {}", message, e), None)
}
