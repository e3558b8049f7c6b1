//! Phone number domain logic.
//!
//! This module encapsulates the rules for detecting and validating
//! North American phone numbers.

use super::PatternMatcher;
use once_cell::sync::Lazy;
use regex::Regex;

/// American phone number pattern matcher.
///
/// Supports various North American Numbering Plan (NANP) formats:
/// - (555) 123-4567
/// - 555-123-4567
/// - 555.123.4567
/// - +1 555 123 4567
#[derive(Debug, Clone)]
pub struct PhoneNumberMatcher;

impl PhoneNumberMatcher {
    /// Creates a new phone number matcher.
    pub fn new() -> Self {
        Self
    }

    /// Returns the regex pattern for NANP phone numbers.
    fn regex() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| {
            Regex::new(
                r"(?:\+?1[-.\s]?)?\(?\b([2-9]\d{2})\)?[-.\s]?\s*(\d{3})[-.\s]?(\d{4})\b",
            )
            .expect("Valid phone number regex")
        });
        &PATTERN
    }

    /// Validates that a phone number follows NANP rules.
    ///
    /// # Rules
    /// - Area code (NXX): First digit 2-9, remaining digits 0-9
    /// - Exchange code: First digit 2-9, remaining digits 0-9
    /// - Subscriber number: Any 4 digits
    pub fn validate_parts(area: &str, exchange: &str, subscriber: &str) -> bool {
        area.len() == 3
            && exchange.len() == 3
            && subscriber.len() == 4
            && area
                .chars()
                .next()
                .is_some_and(|c| ('2'..='9').contains(&c))
            && exchange
                .chars()
                .next()
                .is_some_and(|c| ('2'..='9').contains(&c))
    }

    /// Reduces a phone number to its ten NANP digits.
    pub fn normalize(&self, text: &str) -> Option<String> {
        self.pattern().captures(text).and_then(|caps| {
            let area = caps.get(1)?.as_str();
            let exchange = caps.get(2)?.as_str();
            let subscriber = caps.get(3)?.as_str();

            Self::validate_parts(area, exchange, subscriber)
                .then(|| format!("{}{}{}", area, exchange, subscriber))
        })
    }
}

impl Default for PhoneNumberMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher for PhoneNumberMatcher {
    fn pii_type(&self) -> &str {
        "Phone"
    }

    fn pattern(&self) -> &Regex {
        Self::regex()
    }

    fn confidence(&self) -> f32 {
        0.9
    }

    fn validate(&self, candidate: &str) -> bool {
        self.normalize(candidate).is_some()
    }

    /// Whole-match ranges; the capture groups are digit parts, not the value.
    fn extract_all(&self, text: &str) -> Vec<std::ops::Range<usize>> {
        self.pattern()
            .find_iter(text)
            .filter_map(|m| super::trim_range(text, m.range()))
            .filter(|r| self.validate(&text[r.clone()]))
            .collect()
    }
}
