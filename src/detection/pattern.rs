//! Rule-based detection pass.

use super::{Detection, Detector};
use crate::domain::{identifiers, medical, PatternMatcher, PhoneNumberMatcher};
use crate::error::RedactorResult;

/// Runs a set of [`PatternMatcher`] rules over text.
pub struct PatternDetector {
    matchers: Vec<Box<dyn PatternMatcher>>,
}

impl PatternDetector {
    pub fn new(matchers: Vec<Box<dyn PatternMatcher>>) -> Self {
        Self { matchers }
    }

    /// Structured identifiers only (no label-driven PHI rules).
    pub fn identifiers() -> Self {
        Self::new(vec![
            Box::new(identifiers::email()),
            Box::new(identifiers::ssn()),
            Box::new(identifiers::credit_card()),
            Box::new(identifiers::ip_address()),
            Box::new(identifiers::web_url()),
            Box::new(identifiers::birthday()),
            Box::new(PhoneNumberMatcher::new()),
        ])
    }

    pub fn with_matcher(mut self, matcher: Box<dyn PatternMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn types(&self) -> Vec<&str> {
        self.matchers.iter().map(|m| m.pii_type()).collect()
    }
}

impl Default for PatternDetector {
    /// Identifiers plus the PHI rules.
    fn default() -> Self {
        Self::identifiers()
            .with_matcher(Box::new(medical::medical_record_number()))
            .with_matcher(Box::new(medical::health_plan_beneficiary_number()))
            .with_matcher(Box::new(medical::medical_condition()))
            .with_matcher(Box::new(medical::medication()))
            .with_matcher(Box::new(medical::doctor_name()))
            .with_matcher(Box::new(medical::hospital_name()))
    }
}

impl Detector for PatternDetector {
    fn name(&self) -> &str {
        "patterns"
    }

    fn covers(&self, pii_type: &str) -> bool {
        self.types().iter().any(|t| t.eq_ignore_ascii_case(pii_type))
    }

    fn detect(&self, text: &str) -> RedactorResult<Vec<Detection>> {
        Ok(self
            .matchers
            .iter()
            .flat_map(|m| {
                m.extract_all(text)
                    .into_iter()
                    .map(move |range| Detection::new(m.pii_type(), range, m.confidence()))
            })
            .collect())
    }
}
