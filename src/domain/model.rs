//! Data carried between pipeline stages.

use crate::config::Action;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Axis-aligned box in page space (points, top-left origin, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Creates a normalized box from two corners.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True for degenerate or non-finite boxes.
    pub fn is_empty(&self) -> bool {
        let finite = [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of a sequence of boxes; `None` when empty.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes
            .into_iter()
            .filter(|b| !b.is_empty())
            .fold(None, |acc: Option<BBox>, b| {
                Some(acc.map_or(*b, |a| a.union(b)))
            })
    }
}

/// Kind of parsed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Text,
    Image,
}

/// A parsed unit of page content. Immutable once produced by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentElement {
    pub kind: ElementKind,
    pub page_index: usize,
    pub bbox: BBox,
    /// Text of the run, or an image reference for image elements
    pub content: String,
    /// Dominant font size in points (0 for images)
    pub font_size: f32,
    /// Per-character boxes, one per `char` of `content`, when known
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glyphs: Vec<BBox>,
    /// Class assigned to an image element, when one was classified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DocumentElement {
    pub fn text(page_index: usize, bbox: BBox, content: impl Into<String>, font_size: f32) -> Self {
        Self {
            kind: ElementKind::Text,
            page_index,
            bbox,
            content: content.into(),
            font_size,
            glyphs: Vec::new(),
            label: None,
        }
    }

    pub fn image(page_index: usize, bbox: BBox, reference: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Image,
            page_index,
            bbox,
            content: reference.into(),
            font_size: 0.0,
            glyphs: Vec::new(),
            label: None,
        }
    }

    pub fn with_glyphs(mut self, glyphs: Vec<BBox>) -> Self {
        self.glyphs = glyphs;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_text(&self) -> bool {
        self.kind == ElementKind::Text
    }

    /// Glyph boxes for a byte range of `content`, when every char has one.
    pub fn glyph_span(&self, range: &Range<usize>) -> Option<BBox> {
        if self.glyphs.len() != self.content.chars().count() {
            return None;
        }
        let start = self.content.get(..range.start)?.chars().count();
        let len = self.content.get(range.clone())?.chars().count();
        BBox::union_all(self.glyphs.get(start..start + len)?)
    }
}

/// Page geometry recorded by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub index: usize,
    pub width: f32,
    pub height: f32,
}

/// Parser output: page geometry plus elements in page order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub pages: Vec<PageInfo>,
    pub elements: Vec<DocumentElement>,
}

impl ParsedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn text_elements(&self) -> impl Iterator<Item = (usize, &DocumentElement)> {
        self.elements.iter().enumerate().filter(|(_, e)| e.is_text())
    }

    pub fn image_elements(&self) -> Vec<DocumentElement> {
        self.elements
            .iter()
            .filter(|e| e.kind == ElementKind::Image)
            .cloned()
            .collect()
    }
}

/// PII or PHI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "PII")]
    Pii,
    #[serde(rename = "PHI")]
    Phi,
}

impl Category {
    /// Category of a type label; anything not known as PHI is PII.
    pub fn for_type(pii_type: &str) -> Self {
        const PHI_TYPES: &[&str] = &[
            "Medical Record Number",
            "Health Plan Beneficiary Number",
            "Account Number",
            "Certificate License Number",
            "Vehicle Identifier",
            "Device Identifier",
            "Web URL",
            "IP Address",
            "Biometric Identifier",
            "Full Face Photo",
            "Medical Condition",
            "Medication",
            "Doctor Name",
            "Hospital Name",
            "Insurance Info",
        ];
        if PHI_TYPES.iter().any(|t| t.eq_ignore_ascii_case(pii_type)) {
            Self::Phi
        } else {
            Self::Pii
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pii => f.write_str("PII"),
            Self::Phi => f.write_str("PHI"),
        }
    }
}

/// One detected sensitive instance, enriched as it moves down the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub pii_type: String,
    pub category: Category,
    pub original_text: String,
    pub confidence: f32,
    pub page_index: usize,
    /// Index of the source element in [`ParsedDocument::elements`]
    pub element_index: usize,
    /// Byte range into the source element's text
    pub range: Range<usize>,
    pub font_size: f32,
    pub action: Action,
    pub replacement_text: Option<String>,
    /// Page-space location, set by the coordinate mapper
    pub bbox: Option<BBox>,
    /// Generation failed and the anonymize token was used instead
    pub degraded: bool,
    /// Mapping failed; kept in the log, not drawn
    pub location_unresolved: bool,
}

impl PiiSpan {
    /// Sets the replacement once; later calls keep the first value.
    pub fn set_replacement(&mut self, text: String, effective: Action, degraded: bool) {
        if self.replacement_text.is_none() {
            self.replacement_text = Some(text);
            self.action = effective;
            self.degraded = degraded;
        }
    }

    pub fn replacement(&self) -> Option<&str> {
        self.replacement_text.as_deref()
    }

    /// True when the span is drawn by the redaction engine.
    pub fn is_applied(&self) -> bool {
        !self.location_unresolved && self.bbox.is_some()
    }
}
