//! PDF backends: MuPDF for structured text and search, printpdf for the
//! reference layout, pdf-extract for plain text.
//!
//! MuPDF contexts are not shared safely between threads, so every MuPDF call
//! in the crate goes through [`with_mupdf`].

pub mod layout;
pub mod mapper;
pub mod parser;

pub use layout::render_reference_layout;
pub use mapper::CoordinateMapper;
pub use parser::parse;

use crate::domain::BBox;
use crate::error::{RedactorError, RedactorResult};
use std::path::Path;
use std::sync::Mutex;

static MUPDF_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` while holding the process-wide MuPDF lock.
pub(crate) fn with_mupdf<T>(f: impl FnOnce() -> T) -> T {
    // A panic in another MuPDF caller leaves no state we depend on.
    let _guard = MUPDF_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    f()
}

/// Rejects input that does not carry a `%PDF-` header near the start.
pub fn check_header(bytes: &[u8]) -> RedactorResult<()> {
    let head = &bytes[..bytes.len().min(1024)];
    if head.windows(5).any(|w| w == b"%PDF-") {
        Ok(())
    } else {
        Err(RedactorError::parse("input is not a PDF (missing %PDF- header)", None))
    }
}

/// Plain text of a PDF in memory.
pub fn extract_text(bytes: &[u8]) -> RedactorResult<String> {
    check_header(bytes)?;
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RedactorError::parse(format!("text extraction failed: {}", e), None))
}

/// Plain text of a PDF file.
pub fn extract_text_from_file(path: &Path) -> RedactorResult<String> {
    let bytes = std::fs::read(path).map_err(|e| RedactorError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    extract_text(&bytes)
}

/// Bounding box of a MuPDF quad.
pub(crate) fn quad_bbox(quad: &mupdf::Quad) -> BBox {
    let xs = [quad.ul.x, quad.ur.x, quad.ll.x, quad.lr.x];
    let ys = [quad.ul.y, quad.ur.y, quad.ll.y, quad.lr.y];
    BBox {
        x0: xs.iter().copied().fold(f32::INFINITY, f32::min),
        y0: ys.iter().copied().fold(f32::INFINITY, f32::min),
        x1: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        y1: ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    }
}

pub(crate) fn rect_bbox(rect: &mupdf::Rect) -> BBox {
    BBox::new(rect.x0, rect.y0, rect.x1, rect.y1)
}
