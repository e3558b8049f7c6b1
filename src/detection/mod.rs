//! PII/PHI detection.
//!
//! Detection runs every registered [`Detector`] pass over each text element,
//! unions the candidates, drops those under the policy threshold and keeps a
//! non-overlapping set per element, preferring higher confidence.

pub mod literal;
pub mod pattern;
pub mod visual;

pub use literal::LiteralDetector;
pub use pattern::PatternDetector;
pub use visual::ImageClassifier;

use crate::config::RedactionPolicy;
use crate::domain::{Category, DocumentElement, ParsedDocument, PiiSpan};
use crate::error::{RedactorError, RedactorResult};
use rayon::prelude::*;
use std::ops::Range;
use tracing::{debug, instrument};

/// A candidate found by one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub pii_type: String,
    /// Byte range into the scanned text
    pub range: Range<usize>,
    pub confidence: f32,
}

impl Detection {
    pub fn new(pii_type: impl Into<String>, range: Range<usize>, confidence: f32) -> Self {
        Self {
            pii_type: pii_type.into(),
            range,
            confidence,
        }
    }

    fn overlaps(&self, other: &Detection) -> bool {
        self.range.start < other.range.end && other.range.start < self.range.end
    }
}

/// One detection pass: a model-backed classifier, a rule set, a term list.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Finds candidates in a single run of text.
    fn detect(&self, text: &str) -> RedactorResult<Vec<Detection>>;

    /// True if this pass can report `pii_type`.
    fn covers(&self, _pii_type: &str) -> bool {
        false
    }
}

/// Runs all passes and resolves their output into spans.
pub struct DetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectionEngine {
    /// An engine with no passes; add them with [`Self::with_detector`].
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// An engine with the built-in pattern rules.
    pub fn with_builtin_rules() -> Self {
        Self::new().with_detector(Box::new(PatternDetector::default()))
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// True if any pass can report `pii_type`.
    pub fn covers(&self, pii_type: &str) -> bool {
        self.detectors.iter().any(|d| d.covers(pii_type))
    }

    /// Detects spans in every text element of the document.
    ///
    /// Elements are scanned in parallel; output keeps document order and,
    /// within an element, ascending start offset.
    #[instrument(skip_all, fields(passes = self.detectors.len()))]
    pub fn detect(
        &self,
        document: &ParsedDocument,
        policy: &RedactionPolicy,
    ) -> RedactorResult<Vec<PiiSpan>> {
        let elements: Vec<(usize, &DocumentElement)> = document.text_elements().collect();

        let per_element = elements
            .par_iter()
            .map(|(index, element)| self.detect_element(*index, element, policy))
            .collect::<RedactorResult<Vec<_>>>()?;

        let spans: Vec<PiiSpan> = per_element.into_iter().flatten().collect();
        debug!(spans = spans.len(), "detection finished");
        Ok(spans)
    }

    fn detect_element(
        &self,
        element_index: usize,
        element: &DocumentElement,
        policy: &RedactionPolicy,
    ) -> RedactorResult<Vec<PiiSpan>> {
        let text = element.content.as_str();
        let mut candidates = Vec::new();

        for detector in &self.detectors {
            let found = detector.detect(text).map_err(|e| {
                RedactorError::backend(
                    detector.name(),
                    format!(
                        "detection failed on page {}: {}",
                        element.page_index + 1,
                        e
                    ),
                    Some(Box::new(e)),
                )
            })?;
            candidates.extend(
                found
                    .into_iter()
                    .filter(|d| is_valid_range(text, &d.range))
                    .filter(|d| d.confidence >= policy.confidence_threshold),
            );
        }

        Ok(resolve_overlaps(candidates)
            .into_iter()
            .map(|d| {
                let original_text = text[d.range.clone()].to_string();
                PiiSpan {
                    category: Category::for_type(&d.pii_type),
                    action: policy.action_for(&d.pii_type),
                    pii_type: d.pii_type,
                    original_text,
                    confidence: d.confidence.clamp(0.0, 1.0),
                    page_index: element.page_index,
                    element_index,
                    range: d.range,
                    font_size: element.font_size,
                    replacement_text: None,
                    bbox: None,
                    degraded: false,
                    location_unresolved: false,
                }
            })
            .collect())
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

fn is_valid_range(text: &str, range: &Range<usize>) -> bool {
    range.start < range.end
        && text
            .get(range.clone())
            .is_some_and(|s| !s.trim().is_empty())
}

/// Greedy overlap resolution.
///
/// Highest confidence first (ties: longer, then earlier); a candidate is
/// accepted unless it overlaps one already accepted. Result is sorted by
/// start offset.
pub fn resolve_overlaps(mut candidates: Vec<Detection>) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.range.len().cmp(&a.range.len()))
            .then_with(|| a.range.start.cmp(&b.range.start))
    });

    let mut accepted: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !accepted.iter().any(|a| a.overlaps(&candidate)) {
            accepted.push(candidate);
        }
    }

    accepted.sort_by_key(|d| d.range.start);
    accepted
}
