//! Stub detectors and generators for deterministic pipeline tests.

use async_trait::async_trait;
use phi_redactor::detection::{Detection, Detector, ImageClassifier};
use phi_redactor::domain::DocumentElement;
use phi_redactor::replacement::{GeneratorError, Generator};
use phi_redactor::RedactorResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Flags every occurrence of fixed `(type, text)` pairs.
pub struct NamedEntityStub {
    entities: Vec<(String, String)>,
    confidence: f32,
}

impl NamedEntityStub {
    pub fn new(entities: &[(&str, &str)]) -> Self {
        Self {
            entities: entities
                .iter()
                .map(|(t, e)| (t.to_string(), e.to_string()))
                .collect(),
            confidence: 0.9,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

impl Detector for NamedEntityStub {
    fn name(&self) -> &str {
        "ner-stub"
    }

    fn covers(&self, pii_type: &str) -> bool {
        self.entities.iter().any(|(t, _)| t == pii_type)
    }

    fn detect(&self, text: &str) -> RedactorResult<Vec<Detection>> {
        Ok(self
            .entities
            .iter()
            .flat_map(|(pii_type, entity)| {
                text.match_indices(entity.as_str())
                    .map(move |(start, m)| Detection::new(pii_type.clone(), start..start + m.len(), self.confidence))
            })
            .collect())
    }
}

/// Gives every image the same class and counts calls.
#[derive(Clone)]
pub struct FixedClassifier {
    label: String,
    calls: Arc<AtomicUsize>,
}

impl FixedClassifier {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageClassifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn classify(&self, _pdf: &[u8], _element: &DocumentElement) -> RedactorResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.label.clone()))
    }
}

/// Returns `Synthetic <type> <n>` and counts calls.
#[derive(Clone, Default)]
pub struct CountingGenerator {
    calls: Arc<AtomicUsize>,
}

impl CountingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, pii_type: &str, _original: &str) -> Result<String, GeneratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Synthetic {} {}", pii_type, n))
    }
}

/// A generator whose service is never reachable.
pub struct UnreachableGenerator;

#[async_trait]
impl Generator for UnreachableGenerator {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn generate(&self, _pii_type: &str, _original: &str) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unavailable("connection refused".to_string()))
    }
}
