//! Redaction engine, overlay and coordinate mapping over parsed fixtures.

use anyhow::Result;
use lopdf::content::{Content, Operation};
use phi_redactor::config::{Action, VisualRedactionMode};
use phi_redactor::domain::{BBox, Category, DocumentElement, ParsedDocument, PiiSpan};
use phi_redactor::pdf::{self, CoordinateMapper};
use phi_redactor::redaction::canvas::{self, page_geometry};
use phi_redactor::redaction::IMAGE_LABEL;
use phi_redactor::{OverlayBuilder, RedactionEngine};

mod common;
use common::*;

/// A span over the first occurrence of `needle` in the first element holding it.
fn span_for(doc: &ParsedDocument, needle: &str, pii_type: &str, replacement: &str) -> PiiSpan {
    span_in(doc, 0, needle, pii_type, replacement)
}

/// Like [`span_for`], on the `nth` element holding `needle`.
fn span_in(doc: &ParsedDocument, nth: usize, needle: &str, pii_type: &str, replacement: &str) -> PiiSpan {
    let (element_index, element) = doc
        .text_elements()
        .filter(|(_, e)| e.content.contains(needle))
        .nth(nth)
        .expect("needle should be on a parsed line");
    let start = element.content.find(needle).expect("needle");
    let range = start..start + needle.len();

    PiiSpan {
        pii_type: pii_type.to_string(),
        category: Category::for_type(pii_type),
        original_text: needle.to_string(),
        confidence: 0.99,
        page_index: element.page_index,
        element_index,
        range: range.clone(),
        font_size: element.font_size,
        action: Action::Anonymize,
        replacement_text: Some(replacement.to_string()),
        bbox: element.glyph_span(&range),
        degraded: false,
        location_unresolved: false,
    }
}

fn photo(page_index: usize) -> DocumentElement {
    DocumentElement::image(page_index, BBox::new(72.0, 300.0, 272.0, 450.0), "image:p1:b9")
}

/// Operations of the stream the engine appended to a page (1-based).
fn stamp_operations(bytes: &[u8], page_number: u32) -> Result<Vec<Operation>> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let page_id = doc.get_pages()[&page_number];
    let stamp = *doc.get_page_contents(page_id).last().expect("page has content");
    let stream = doc.get_object(stamp)?.as_stream()?;
    let content = stream.decompressed_content().unwrap_or_else(|_| stream.content.clone());
    Ok(Content::decode(&content)?.operations)
}

fn operands(op: &Operation) -> Vec<f32> {
    op.operands.iter().filter_map(|o| o.as_float().ok()).collect()
}

fn close(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() <= tolerance
}

mod parsing {
    use super::*;

    #[test]
    fn test_parse_reports_lines_with_glyphs() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let doc = pdf::parse(&bytes)?;

        assert_eq!(doc.page_count(), 1);
        let line = doc
            .text_elements()
            .map(|(_, e)| e)
            .find(|e| e.content.contains("John Smith"))
            .expect("patient line");
        assert_eq!(line.glyphs.len(), line.content.chars().count());
        assert!(line.font_size > 10.0 && line.font_size < 14.0);
        assert!(!line.bbox.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_keeps_page_order() -> Result<()> {
        let bytes = TestPdfBuilder::new()
            .with_line("first page line")
            .new_page()
            .with_line("second page line")
            .build_bytes()?;
        let doc = pdf::parse(&bytes)?;

        assert_eq!(doc.page_count(), 2);
        let pages: Vec<usize> = doc.text_elements().map(|(_, e)| e.page_index).collect();
        assert!(pages.windows(2).all(|w| w[0] <= w[1]));
        assert!(doc
            .text_elements()
            .any(|(_, e)| e.page_index == 1 && e.content.contains("second page line")));
        Ok(())
    }
}

mod stamping {
    use super::*;

    #[test]
    fn test_replacement_drawn_over_span() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let doc = pdf::parse(&bytes)?;
        let span = span_for(&doc, "john.smith@example.com", "Email", "[EMAIL_REDACTED]");
        assert!(span.bbox.is_some());

        let out = RedactionEngine::new().apply(&bytes, &[span], &[], VisualRedactionMode::Textbox)?;

        assert_valid_pdf(&out, 1);
        assert_ne!(out, bytes);
        assert_replacement_drawn(&out, "[EMAIL_REDACTED]");
        Ok(())
    }

    #[test]
    fn test_unresolved_span_is_not_drawn() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let doc = pdf::parse(&bytes)?;
        let mut span = span_for(&doc, "John Smith", "Name", "Jordan Ellis");
        span.bbox = None;
        span.location_unresolved = true;

        let stamped = RedactionEngine::new().stamp(&bytes, &[span], &[], VisualRedactionMode::Textbox)?;

        assert!(stamped.is_unchanged());
        assert_eq!(stamped.summary.spans_applied, 0);
        Ok(())
    }

    #[test]
    fn test_textbox_mode_labels_images() -> Result<()> {
        let bytes = clean_document().build_bytes()?;

        let stamped = RedactionEngine::new().stamp(&bytes, &[], &[photo(0)], VisualRedactionMode::Textbox)?;
        assert_eq!(stamped.summary.images_covered, 1);
        assert_eq!(stamped.summary.pages_modified, 1);

        let out = RedactionEngine::new().encode(&bytes, stamped)?;
        assert_replacement_drawn(&out, IMAGE_LABEL);
        Ok(())
    }

    #[test]
    fn test_replacement_mode_draws_placeholder_image() -> Result<()> {
        let bytes = clean_document().build_bytes()?;

        let out = RedactionEngine::new().apply(&bytes, &[], &[photo(0)], VisualRedactionMode::Replacement)?;

        assert_not_drawn(&out, IMAGE_LABEL);
        let content = page_content(&out, 1)?;
        let content = String::from_utf8_lossy(&content);
        assert!(content.contains("Do"), "placeholder image should be painted");
        Ok(())
    }

    #[test]
    fn test_long_replacement_fits_inside_cover() -> Result<()> {
        let token = "[MEDICAL_RECORD_NUMBER_REDACTED]";
        let bytes = TestPdfBuilder::new().with_line("MRN: 00123456").build_bytes()?;
        let doc = pdf::parse(&bytes)?;
        let span = span_for(&doc, "00123456", "Medical Record Number", token);

        let out = RedactionEngine::new().apply(&bytes, &[span], &[], VisualRedactionMode::Textbox)?;
        let ops = stamp_operations(&out, 1)?;

        let cover = ops.iter().find(|op| op.operator == "re").expect("cover rect");
        let cover_width = operands(cover)[2];
        assert!(ops.iter().any(|op| op.operator == "W"), "replacement should be clipped to its cover");

        let size = ops
            .iter()
            .find(|op| op.operator == "Tf")
            .and_then(|op| op.operands.get(1))
            .and_then(|o| o.as_float().ok())
            .expect("font size");
        let scale = ops
            .iter()
            .find(|op| op.operator == "Tz")
            .map(|op| operands(op)[0] / 100.0)
            .expect("long token should be condensed");
        let drawn = canvas::text_width(token, size) * scale;
        assert!(
            drawn <= cover_width + 0.01,
            "drawn width {} exceeds cover width {}",
            drawn,
            cover_width
        );
        Ok(())
    }

    #[test]
    fn test_textbox_mode_draws_image_class() -> Result<()> {
        let bytes = clean_document().build_bytes()?;
        let image = photo(0).with_label("Full Face Photo");

        let out = RedactionEngine::new().apply(&bytes, &[], &[image], VisualRedactionMode::Textbox)?;

        assert_replacement_drawn(&out, "Full Face Photo");
        assert_not_drawn(&out, IMAGE_LABEL);
        Ok(())
    }

    #[test]
    fn test_original_streams_kept() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let doc = pdf::parse(&bytes)?;
        let before = page_content(&bytes, 1)?;
        let span = span_for(&doc, "John Smith", "Name", "Jordan Ellis");

        let out = RedactionEngine::new().apply(&bytes, &[span], &[], VisualRedactionMode::Textbox)?;
        let after = page_content(&out, 1)?;

        assert!(after.len() > before.len());
        assert!(after.windows(before.len()).any(|w| w == before.as_slice()));
        Ok(())
    }
}

mod overlay {
    use super::*;

    #[test]
    fn test_overlay_tags_spans_and_images() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let doc = pdf::parse(&bytes)?;
        let mut span = span_for(&doc, "John Smith", "Name", "Jordan Ellis");
        span.action = Action::DummyReplacement;

        let out = OverlayBuilder::new().build(&bytes, &[span], &[photo(0)], VisualRedactionMode::Textbox)?;

        assert_valid_pdf(&out, 1);
        assert_eq!(annotation_count(&out, "Highlight")?, 2);
        assert_replacement_drawn(&out, "Name - dummy_replacement");
        assert_replacement_drawn(&out, "Visual Element - textbox");
        Ok(())
    }

    #[test]
    fn test_overlay_without_marks_is_input() -> Result<()> {
        let bytes = clean_document().build_bytes()?;
        let out = OverlayBuilder::new().build(&bytes, &[], &[], VisualRedactionMode::Replacement)?;
        assert_eq!(out, bytes);
        Ok(())
    }
}

mod mapping {
    use super::*;

    #[test]
    fn test_layout_search_recovers_boxes_without_glyphs() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let mut doc = pdf::parse(&bytes)?;
        for element in &mut doc.elements {
            element.glyphs.clear();
        }
        let mut spans = vec![span_for(&doc, "John Smith", "Name", "Jordan Ellis")];
        assert!(spans[0].bbox.is_none());

        let layout = pdf::render_reference_layout(&doc)?;
        let report = CoordinateMapper::new().map(&doc, &mut spans, Some(&layout));

        assert_eq!(report.from_search, 1);
        assert_eq!(report.unresolved, 0);
        let bbox = spans[0].bbox.expect("mapped");
        assert!(!bbox.is_empty());
        assert!(!spans[0].location_unresolved);
        Ok(())
    }

    #[test]
    fn test_layout_search_keeps_repeated_text_on_its_line() -> Result<()> {
        let bytes = TestPdfBuilder::new()
            .with_line("Patient: John Smith")
            .with_line("Guardian: John Smith")
            .build_bytes()?;
        let mut doc = pdf::parse(&bytes)?;
        for element in &mut doc.elements {
            element.glyphs.clear();
        }
        let mut spans = vec![
            span_in(&doc, 0, "John Smith", "Name", "Jordan Ellis"),
            span_in(&doc, 1, "John Smith", "Name", "Casey Moore"),
        ];
        assert_ne!(spans[0].element_index, spans[1].element_index);

        let layout = pdf::render_reference_layout(&doc)?;
        let report = CoordinateMapper::new().map(&doc, &mut spans, Some(&layout));
        assert_eq!(report.from_search, 2);

        for span in &spans {
            let line = doc.elements[span.element_index].bbox;
            let bbox = span.bbox.expect("mapped");
            let (cx, cy) = ((bbox.x0 + bbox.x1) / 2.0, (bbox.y0 + bbox.y1) / 2.0);
            assert!(
                cx >= line.x0 - 2.0 && cx <= line.x1 + 2.0 && cy >= line.y0 - 2.0 && cy <= line.y1 + 2.0,
                "span box {:?} should sit on its line {:?}",
                bbox,
                line
            );
        }
        let (first, second) = (spans[0].bbox.expect("mapped"), spans[1].bbox.expect("mapped"));
        assert!(first.y0 < second.y0, "first occurrence should be the upper line");
        Ok(())
    }

    #[test]
    fn test_missing_text_is_unresolved() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let mut doc = pdf::parse(&bytes)?;
        for element in &mut doc.elements {
            element.glyphs.clear();
        }
        let mut span = span_for(&doc, "John Smith", "Name", "Jordan Ellis");
        span.original_text = "Nobody Here".to_string();

        let layout = pdf::render_reference_layout(&doc)?;
        let mut spans = vec![span];
        let report = CoordinateMapper::new().map(&doc, &mut spans, Some(&layout));

        assert_eq!(report.unresolved, 1);
        assert!(spans[0].location_unresolved);
        assert!(spans[0].bbox.is_none());
        Ok(())
    }
}

mod geometry {
    use super::*;

    /// Baseline of the first fixture line, in points from the page bottom.
    const FIRST_BASELINE: f32 = 737.0;
    const LEFT_MARGIN: f32 = 56.69;

    /// User-space box of "John Smith" as parsed from `bytes`.
    fn name_box(bytes: &[u8]) -> Result<(f32, f32, f32, f32)> {
        let doc = pdf::parse(bytes)?;
        let bbox = span_for(&doc, "John Smith", "Name", "Jordan Ellis")
            .bbox
            .expect("glyph boxes");
        let raw = lopdf::Document::load_mem(bytes)?;
        let page_id = raw.get_pages()[&1];
        Ok(page_geometry(&raw, page_id).to_user_space(&bbox))
    }

    fn assert_same_box(actual: (f32, f32, f32, f32), expected: (f32, f32, f32, f32), tolerance: f32) {
        let pairs = [
            (actual.0, expected.0),
            (actual.1, expected.1),
            (actual.2, expected.2),
            (actual.3, expected.3),
        ];
        assert!(
            pairs.iter().all(|(a, e)| close(*a, *e, tolerance)),
            "box {:?} should match {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_upright_box_sits_on_the_baseline() -> Result<()> {
        let (x, y, w, h) = name_box(&patient_record().build_bytes()?)?;
        assert!(y < FIRST_BASELINE && FIRST_BASELINE < y + h);
        assert!(x > LEFT_MARGIN);
        assert!(w > 0.0);
        Ok(())
    }

    #[test]
    fn test_rotated_pages_cover_the_same_glyphs() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let upright = name_box(&bytes)?;

        for rotate in [90, 180, 270] {
            let rotated = reframe_pages(&bytes, Some(rotate), None)?;
            assert_same_box(name_box(&rotated)?, upright, 0.5);
        }
        Ok(())
    }

    #[test]
    fn test_cropped_page_covers_the_same_glyphs() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let upright = name_box(&bytes)?;

        let cropped = reframe_pages(&bytes, None, Some([40.0, 60.0, 560.0, 800.0]))?;
        assert_same_box(name_box(&cropped)?, upright, 0.5);

        let both = reframe_pages(&bytes, Some(90), Some([40.0, 60.0, 560.0, 800.0]))?;
        assert_same_box(name_box(&both)?, upright, 0.5);
        Ok(())
    }

    #[test]
    fn test_cover_on_rotated_page_lands_on_glyphs() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        let upright = name_box(&bytes)?;

        let rotated = reframe_pages(&bytes, Some(90), None)?;
        let doc = pdf::parse(&rotated)?;
        let span = span_for(&doc, "John Smith", "Name", "Jordan Ellis");
        let out = RedactionEngine::new().apply(&rotated, &[span], &[], VisualRedactionMode::Textbox)?;

        let ops = stamp_operations(&out, 1)?;
        let cm = ops.iter().position(|op| op.operator == "cm").expect("page matrix");
        let [a, b, c, d, e, f]: [f32; 6] = operands(&ops[cm]).try_into().expect("six operands");
        let rect = ops[cm..].iter().find(|op| op.operator == "re").expect("cover rect");
        let (x, y, w, h) = match operands(rect)[..] {
            [x, y, w, h] => (x, y, w, h),
            _ => panic!("re takes four operands"),
        };

        let corners = [(x, y), (x + w, y), (x, y + h), (x + w, y + h)]
            .map(|(px, py)| (a * px + c * py + e, b * px + d * py + f));
        let x0 = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let y0 = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let x1 = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let y1 = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

        assert_same_box((x0, y0, x1 - x0, y1 - y0), upright, 1.0);
        Ok(())
    }
}
