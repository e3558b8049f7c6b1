//! Offline synthetic value generator.
//!
//! Picks a plausible value for the type from a fixed table. The choice is
//! derived from a digest of the original so it is stable across runs, and a
//! value equal to the original is never returned.

use super::{Generator, GeneratorError};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Table-backed [`Generator`] that never leaves the process.
#[derive(Debug, Clone, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    fn candidates(pii_type: &str) -> &'static [&'static str] {
        match pii_type.to_ascii_lowercase().as_str() {
            "name" => &[
                "Jordan Ellis",
                "Avery Collins",
                "Morgan Reyes",
                "Casey Whitfield",
                "Riley Navarro",
                "Quinn Hartley",
            ],
            "doctor name" => &["Dr. Priya Raman", "Dr. Samuel Okafor", "Dr. Elena Varga"],
            "address" => &[
                "123 Main Street, Anytown, ST 12345",
                "48 Orchard Lane, Springfield, ST 62704",
                "907 Harbor Road, Lakeside, ST 30112",
            ],
            "email" => &[
                "jordan.ellis@example.com",
                "a.collins@example.org",
                "m.reyes@example.net",
            ],
            "phone" => &["(555) 123-4567", "(555) 201-7788", "(555) 310-4402"],
            "ssn" => &["123-45-6789", "219-09-9999", "078-05-1120"],
            "birthday" => &["01/15/1985", "07/02/1979", "11/23/1991"],
            "credit card" => &["4111 1111 1111 1111", "5500 0000 0000 0004"],
            "passport" => &["A12345678", "X98765432"],
            "age" => &["35", "42", "58"],
            "gender" => &["Non-binary", "Unspecified"],
            "race" => &["Mixed", "Unspecified"],
            "location" => &["Sample City", "Riverton", "Oakdale"],
            "medical condition" => &["General wellness check", "Seasonal allergies"],
            "medication" => &["Over-the-counter supplement", "Multivitamin"],
            "hospital name" => &["General Medical Center", "Riverside Community Hospital"],
            "medical record number" => &["MRN123456", "MRN908172"],
            "health plan beneficiary number" => &["HPN987654", "HPN445566"],
            "account number" => &["ACC123456789", "ACC987650321"],
            "web url" => &["https://example.com", "https://example.org/portal"],
            "ip address" => &["192.168.1.1", "10.0.0.24"],
            _ => &[],
        }
    }
}

#[async_trait]
impl Generator for FallbackGenerator {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, pii_type: &str, original: &str) -> Result<String, GeneratorError> {
        let candidates = Self::candidates(pii_type);
        if candidates.is_empty() {
            return Ok(format!("[Dummy {}]", pii_type));
        }

        let digest = Sha256::digest(original.as_bytes());
        let start = usize::from(digest[0]) % candidates.len();

        (0..candidates.len())
            .map(|offset| candidates[(start + offset) % candidates.len()])
            .find(|c| !c.eq_ignore_ascii_case(original.trim()))
            .map(str::to_string)
            .ok_or_else(|| GeneratorError::Empty(pii_type.to_string()))
    }
}
