//! Domain models and pattern rules for sensitive data.
//!
//! [`model`] holds the types that flow between pipeline stages. The
//! remaining modules hold the pattern rules used by the built-in detector:
//! structured identifiers in [`identifiers`] and [`phone`], and the
//! health-record rules in [`medical`].

pub mod identifiers;
pub mod medical;
pub mod model;
pub mod phone;

pub use model::{BBox, Category, DocumentElement, ElementKind, PageInfo, ParsedDocument, PiiSpan};
pub use phone::PhoneNumberMatcher;

use regex::Regex;
use std::ops::Range;

/// A regex-backed rule that finds one PII/PHI type in text.
///
/// When the pattern has a first capture group, the group is the sensitive
/// part of the match (e.g. the number after an `MRN:` label).
pub trait PatternMatcher: Send + Sync {
    fn pii_type(&self) -> &str;
    fn pattern(&self) -> &Regex;
    fn confidence(&self) -> f32;

    /// Extra check applied to each candidate (checksums, ranges).
    fn validate(&self, _candidate: &str) -> bool {
        true
    }

    /// Byte ranges of every validated match, whitespace-trimmed.
    fn extract_all(&self, text: &str) -> Vec<Range<usize>> {
        self.pattern()
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .filter_map(|m| trim_range(text, m.range()))
            .filter(|r| self.validate(&text[r.clone()]))
            .collect()
    }
}

/// A rule defined by data: type label, regex, confidence, optional check.
pub struct RuleMatcher {
    pii_type: &'static str,
    pattern: &'static Regex,
    confidence: f32,
    validator: Option<fn(&str) -> bool>,
}

impl RuleMatcher {
    pub fn new(pii_type: &'static str, pattern: &'static Regex, confidence: f32) -> Self {
        Self {
            pii_type,
            pattern,
            confidence,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: fn(&str) -> bool) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl PatternMatcher for RuleMatcher {
    fn pii_type(&self) -> &str {
        self.pii_type
    }

    fn pattern(&self) -> &Regex {
        self.pattern
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }

    fn validate(&self, candidate: &str) -> bool {
        self.validator.map_or(true, |check| check(candidate))
    }
}

/// Shrinks a range to exclude surrounding whitespace; `None` if nothing is left.
pub fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = text.get(range.clone())?;
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    let trimmed = range.start + leading..range.end - trailing;
    (trimmed.start < trimmed.end).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_range() {
        let text = "  hello  ";
        assert_eq!(trim_range(text, 0..text.len()), Some(2..7));
        assert_eq!(trim_range(text, 0..2), None);
    }
}
