//! Caller-supplied literal terms.

use super::{Detection, Detector};
use crate::error::{RedactorError, RedactorResult};
use std::str::FromStr;

/// A literal term to redact with the type it should be logged as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralTerm {
    pub pii_type: String,
    pub text: String,
}

impl FromStr for LiteralTerm {
    type Err = RedactorError;

    /// Parses `TYPE=TEXT`, e.g. `Name=John Smith`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pii_type, text) = s.split_once('=').ok_or_else(|| RedactorError::InvalidInput {
            parameter: "term".to_string(),
            reason: format!("expected TYPE=TEXT, got '{}'", s),
        })?;
        let (pii_type, text) = (pii_type.trim(), text.trim());
        if pii_type.is_empty() || text.is_empty() {
            return Err(RedactorError::InvalidInput {
                parameter: "term".to_string(),
                reason: format!("type and text must be non-empty in '{}'", s),
            });
        }
        Ok(Self {
            pii_type: pii_type.to_string(),
            text: text.to_string(),
        })
    }
}

/// Exact-match detector for known values; every hit has confidence 1.0.
#[derive(Debug, Clone, Default)]
pub struct LiteralDetector {
    terms: Vec<LiteralTerm>,
}

impl LiteralDetector {
    pub fn new(terms: Vec<LiteralTerm>) -> Self {
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Detector for LiteralDetector {
    fn name(&self) -> &str {
        "literals"
    }

    fn covers(&self, pii_type: &str) -> bool {
        self.terms.iter().any(|t| t.pii_type.eq_ignore_ascii_case(pii_type))
    }

    fn detect(&self, text: &str) -> RedactorResult<Vec<Detection>> {
        Ok(self
            .terms
            .iter()
            .flat_map(|term| {
                text.match_indices(term.text.as_str()).map(move |(start, m)| {
                    Detection::new(term.pii_type.clone(), start..start + m.len(), 1.0)
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_parsing() {
        let term: LiteralTerm = "Name = John Smith".parse().unwrap();
        assert_eq!(term.pii_type, "Name");
        assert_eq!(term.text, "John Smith");
        assert!("John Smith".parse::<LiteralTerm>().is_err());
        assert!("Name=".parse::<LiteralTerm>().is_err());
    }

    #[test]
    fn test_every_occurrence_found() {
        let detector = LiteralDetector::new(vec!["Name=John Smith".parse().unwrap()]);
        let found = detector.detect("John Smith met John Smith").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].range, 15..25);
    }
}
