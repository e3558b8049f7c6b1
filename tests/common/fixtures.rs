//! Test fixtures and PDF builders.
//!
//! Builds small text PDFs with printpdf. Every line is written with its own
//! text object so MuPDF reports it as a separate line with glyph boxes.

use anyhow::Result;
use printpdf::*;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

const LINE_HEIGHT_MM: f32 = 8.0;
const TOP_MARGIN_MM: f32 = 25.0;
const LEFT_MARGIN_MM: f32 = 20.0;
const IMAGE_SIDE_PX: usize = 8;

/// Builder for test PDFs with line-oriented content.
///
/// # Example
///
/// ```no_run
/// # use anyhow::Result;
/// # fn main() -> Result<()> {
/// let bytes = TestPdfBuilder::new()
///     .with_title("Discharge Summary")
///     .with_line("Patient: John Smith")
///     .new_page()
///     .with_line("Email: john.smith@example.com")
///     .build_bytes()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TestPdfBuilder {
    title: String,
    pages: Vec<Vec<String>>,
    /// `(page, x, y)` of grey squares, bottom-left corner in mm
    images: Vec<(usize, f32, f32)>,
    page_width: Mm,
    page_height: Mm,
}

impl TestPdfBuilder {
    pub fn new() -> Self {
        Self {
            title: "Test Document".to_string(),
            pages: vec![Vec::new()],
            images: Vec::new(),
            page_width: Mm(210.0),
            page_height: Mm(297.0),
        }
    }

    /// Sets the document title; it is also written as the first line.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Appends a line to the current page.
    pub fn with_line(mut self, line: &str) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.push(line.to_string());
        }
        self
    }

    /// Places a 64pt grey square on the current page, bottom-left corner at
    /// `(x, y)` mm.
    pub fn with_image_at(mut self, x: f32, y: f32) -> Self {
        self.images.push((self.pages.len() - 1, x, y));
        self
    }

    /// Starts a new page.
    pub fn new_page(mut self) -> Self {
        self.pages.push(Vec::new());
        self
    }

    pub fn with_dimensions(mut self, width: f32, height: f32) -> Self {
        self.page_width = Mm(width);
        self.page_height = Mm(height);
        self
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Renders the document to bytes.
    pub fn build_bytes(&self) -> Result<Vec<u8>> {
        let (doc, first_page, first_layer) =
            PdfDocument::new(&self.title, self.page_width, self.page_height, "Layer 1");
        let font = doc.add_builtin_font(BuiltinFont::Helvetica)?;

        for (index, lines) in self.pages.iter().enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) = doc.add_page(self.page_width, self.page_height, "Layer 1");
                doc.get_page(page).get_layer(layer)
            };

            let mut y = self.page_height.0 - TOP_MARGIN_MM;
            if index == 0 {
                layer.use_text(self.title.as_str(), 14.0, Mm(LEFT_MARGIN_MM), Mm(y), &font);
                y -= LINE_HEIGHT_MM * 1.5;
            }
            for line in lines {
                layer.use_text(line.as_str(), 12.0, Mm(LEFT_MARGIN_MM), Mm(y), &font);
                y -= LINE_HEIGHT_MM;
            }
            for (_, x, y) in self.images.iter().filter(|(page, _, _)| *page == index) {
                grey_square().add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(Mm(*x)),
                        translate_y: Some(Mm(*y)),
                        scale_x: Some(8.0),
                        scale_y: Some(8.0),
                        dpi: Some(72.0),
                        ..Default::default()
                    },
                );
            }
        }

        let mut writer = BufWriter::new(Vec::new());
        doc.save(&mut writer)?;
        Ok(writer.into_inner()?)
    }

    /// Renders the document and writes it to `output_path`.
    pub fn build(&self, output_path: &Path) -> Result<PathBuf> {
        fs::write(output_path, self.build_bytes()?)?;
        Ok(output_path.to_path_buf())
    }
}

impl Default for TestPdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn grey_square() -> Image {
    Image::from(ImageXObject {
        width: Px(IMAGE_SIDE_PX),
        height: Px(IMAGE_SIDE_PX),
        color_space: ColorSpace::Greyscale,
        bits_per_component: ColorBits::Bit8,
        interpolate: false,
        image_data: vec![0x80; IMAGE_SIDE_PX * IMAGE_SIDE_PX],
        image_filter: None,
        smask: None,
        clipping_bbox: None,
    })
}

/// Sets `/Rotate` and `/CropBox` on every page of an existing PDF.
pub fn reframe_pages(bytes: &[u8], rotate: Option<i64>, crop_box: Option<[f32; 4]>) -> Result<Vec<u8>> {
    let mut doc = ::lopdf::Document::load_mem(bytes)?;
    let page_ids: Vec<::lopdf::ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        if let Some(rotate) = rotate {
            page.set("Rotate", rotate);
        }
        if let Some(crop_box) = crop_box {
            page.set(
                "CropBox",
                ::lopdf::Object::Array(crop_box.iter().map(|v| ::lopdf::Object::Real(*v)).collect()),
            );
        }
    }
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// A one-page patient record with a name and an email address.
pub fn patient_record() -> TestPdfBuilder {
    TestPdfBuilder::new()
        .with_title("Patient Intake")
        .with_line("Patient: John Smith")
        .with_line("Email: john.smith@example.com")
        .with_line("Visit reason: routine follow-up")
}

/// A document with no PII/PHI the built-in rules would flag.
pub fn clean_document() -> TestPdfBuilder {
    TestPdfBuilder::new()
        .with_title("Quarterly Newsletter")
        .with_line("The cafeteria menu changes next week.")
        .with_line("Parking lot B will be repaved in spring.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pages() {
        let builder = TestPdfBuilder::new().with_line("a").new_page().with_line("b");
        assert_eq!(builder.page_count(), 2);
    }

    #[test]
    fn test_reframed_pages_carry_rotation() -> Result<()> {
        let bytes = reframe_pages(&patient_record().build_bytes()?, Some(90), Some([40.0, 60.0, 560.0, 800.0]))?;
        let doc = ::lopdf::Document::load_mem(&bytes)?;
        let page_id = doc.get_pages()[&1];
        let page = doc.get_dictionary(page_id)?;
        assert_eq!(page.get(b"Rotate")?.as_i64()?, 90);
        assert_eq!(page.get(b"CropBox")?.as_array()?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_build_bytes_is_pdf() -> Result<()> {
        let bytes = patient_record().build_bytes()?;
        assert!(bytes.starts_with(b"%PDF-"));
        Ok(())
    }
}
