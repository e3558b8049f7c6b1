//! Replacement text for detected spans.
//!
//! Every span gets exactly one replacement. Spans sharing a type and original
//! text get the same one: values are computed once per distinct key and held
//! in a per-job cache. Generator calls run concurrently, bounded by a
//! semaphore shared across jobs, and each call has its own timeout. A failed
//! or unusable generation never fails the job; the span falls back to the
//! anonymize token and is flagged as degraded.

pub mod fallback;
pub mod openrouter;
pub mod transform;

pub use fallback::FallbackGenerator;
pub use openrouter::{OpenRouterConfig, OpenRouterGenerator};
pub use transform::{anonymize_token, encrypt_token, rewrite};

use crate::config::{Action, RedactionPolicy};
use crate::domain::PiiSpan;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Reasons a generator produced nothing usable.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator returned no usable value for {0}")]
    Empty(String),

    #[error("generator request failed: {0}")]
    Request(String),

    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of synthetic values for the dummy-replacement action.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// A plausible fake value of `pii_type` shaped like `original`.
    async fn generate(&self, pii_type: &str, original: &str) -> Result<String, GeneratorError>;
}

/// Concurrency bound and per-call timeout for generator calls.
///
/// Cloning shares the semaphore, so one instance bounds every job it is
/// handed to.
#[derive(Debug, Clone)]
pub struct GenerationLimits {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl GenerationLimits {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self::new(4, Duration::from_secs(30))
    }
}

/// A computed replacement, as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub text: String,
    /// Action actually applied
    pub action: Action,
    pub degraded: bool,
}

type CacheKey = (String, String);

/// Per-job memo of `(type, original) -> replacement`.
#[derive(Debug, Default)]
pub struct ReplacementCache {
    entries: Mutex<HashMap<CacheKey, Replacement>>,
}

impl ReplacementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pii_type: &str, original: &str) -> Option<Replacement> {
        self.lock()
            .get(&(pii_type.to_string(), original.to_string()))
            .cloned()
    }

    fn insert(&self, key: CacheKey, value: Replacement) {
        self.lock().entry(key).or_insert(value);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Replacement>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fills in `replacement_text` on spans.
pub struct ReplacementEngine {
    generator: Arc<dyn Generator>,
    limits: GenerationLimits,
}

impl ReplacementEngine {
    pub fn new(generator: Arc<dyn Generator>, limits: GenerationLimits) -> Self {
        Self { generator, limits }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Assigns a replacement to every span using a fresh cache.
    pub async fn generate(&self, spans: &mut [PiiSpan], policy: &RedactionPolicy) {
        self.generate_with_cache(spans, policy, &ReplacementCache::new())
            .await
    }

    /// Assigns a replacement to every span, reusing `cache` entries.
    #[instrument(skip_all, fields(spans = spans.len(), generator = self.generator.name()))]
    pub async fn generate_with_cache(
        &self,
        spans: &mut [PiiSpan],
        policy: &RedactionPolicy,
        cache: &ReplacementCache,
    ) {
        let mut pending: Vec<(CacheKey, Action)> = Vec::new();
        for span in spans.iter() {
            let key = (span.pii_type.clone(), span.original_text.clone());
            if cache.get(&key.0, &key.1).is_none() && !pending.iter().any(|(k, _)| *k == key) {
                pending.push((key, span.action));
            }
        }

        debug!(distinct = pending.len(), "computing replacements");
        let computed = join_all(
            pending
                .iter()
                .map(|((pii_type, original), action)| self.compute(pii_type, original, *action, policy)),
        )
        .await;

        for ((key, _), replacement) in pending.into_iter().zip(computed) {
            cache.insert(key, replacement);
        }

        for span in spans.iter_mut() {
            if let Some(r) = cache.get(&span.pii_type, &span.original_text) {
                span.set_replacement(r.text, r.action, r.degraded);
            }
        }
    }

    async fn compute(
        &self,
        pii_type: &str,
        original: &str,
        action: Action,
        policy: &RedactionPolicy,
    ) -> Replacement {
        let text = match action {
            Action::Anonymize => anonymize_token(pii_type),
            Action::Rewrite => rewrite(policy.key(), pii_type, original),
            Action::Encrypt => encrypt_token(policy.key(), pii_type, original),
            Action::DummyReplacement => match self.call_generator(pii_type, original).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(pii_type, error = %e, "replacement generation failed, anonymizing");
                    return Replacement {
                        text: anonymize_token(pii_type),
                        action: Action::Anonymize,
                        degraded: true,
                    };
                }
            },
        };

        Replacement {
            text,
            action,
            degraded: false,
        }
    }

    async fn call_generator(&self, pii_type: &str, original: &str) -> Result<String, GeneratorError> {
        let _permit = self
            .limits
            .semaphore
            .acquire()
            .await
            .map_err(|_| GeneratorError::Unavailable("generation limits closed".to_string()))?;

        let value = tokio::time::timeout(
            self.limits.timeout,
            self.generator.generate(pii_type, original),
        )
        .await
        .map_err(|_| GeneratorError::Timeout(self.limits.timeout))??;

        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(original.trim()) {
            return Err(GeneratorError::Empty(pii_type.to_string()));
        }
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, pii_type: &str, _original: &str) -> Result<String, GeneratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("fake-{}-{}", pii_type, n))
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl Generator for DownGenerator {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _: &str, _: &str) -> Result<String, GeneratorError> {
            Err(GeneratorError::Unavailable("connection refused".to_string()))
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _: &str, original: &str) -> Result<String, GeneratorError> {
            Ok(original.to_uppercase())
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _: &str, _: &str) -> Result<String, GeneratorError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn span(pii_type: &str, original: &str, action: Action) -> PiiSpan {
        PiiSpan {
            pii_type: pii_type.to_string(),
            category: Category::for_type(pii_type),
            original_text: original.to_string(),
            confidence: 0.9,
            page_index: 0,
            element_index: 0,
            range: 0..original.len(),
            font_size: 12.0,
            action,
            replacement_text: None,
            bbox: None,
            degraded: false,
            location_unresolved: false,
        }
    }

    #[tokio::test]
    async fn test_identical_originals_share_one_call() {
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let engine = ReplacementEngine::new(generator.clone(), GenerationLimits::default());
        let mut spans = vec![
            span("Email", "a@b.org", Action::DummyReplacement),
            span("Email", "a@b.org", Action::DummyReplacement),
            span("Email", "c@d.org", Action::DummyReplacement),
        ];

        engine.generate(&mut spans, &RedactionPolicy::default()).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(spans[0].replacement(), spans[1].replacement());
        assert_ne!(spans[0].replacement(), spans[2].replacement());
    }

    #[tokio::test]
    async fn test_cache_is_reused_across_calls() {
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let engine = ReplacementEngine::new(generator.clone(), GenerationLimits::default());
        let cache = ReplacementCache::new();
        let policy = RedactionPolicy::default();

        let mut first = vec![span("Phone", "555-0100", Action::DummyReplacement)];
        engine.generate_with_cache(&mut first, &policy, &cache).await;
        let mut second = vec![span("Phone", "555-0100", Action::DummyReplacement)];
        engine.generate_with_cache(&mut second, &policy, &cache).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first[0].replacement(), second[0].replacement());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_generator_degrades() {
        let engine = ReplacementEngine::new(Arc::new(DownGenerator), GenerationLimits::default());
        let mut spans = vec![
            span("Email", "a@b.org", Action::DummyReplacement),
            span("SSN", "123-45-6789", Action::Anonymize),
        ];

        engine.generate(&mut spans, &RedactionPolicy::default()).await;

        assert_eq!(spans[0].replacement(), Some("[EMAIL_REDACTED]"));
        assert_eq!(spans[0].action, Action::Anonymize);
        assert!(spans[0].degraded);
        assert_eq!(spans[1].replacement(), Some("[SSN_REDACTED]"));
        assert!(!spans[1].degraded);
    }

    #[tokio::test]
    async fn test_echoed_original_is_rejected() {
        let engine = ReplacementEngine::new(Arc::new(EchoGenerator), GenerationLimits::default());
        let mut spans = vec![span("Name", "John Smith", Action::DummyReplacement)];

        engine.generate(&mut spans, &RedactionPolicy::default()).await;

        assert!(spans[0].degraded);
        assert_eq!(spans[0].replacement(), Some("[NAME_REDACTED]"));
    }

    #[tokio::test]
    async fn test_slow_generator_times_out() {
        let limits = GenerationLimits::new(1, Duration::from_millis(50));
        let engine = ReplacementEngine::new(Arc::new(SlowGenerator), limits);
        let mut spans = vec![span("Address", "1 Elm St", Action::DummyReplacement)];

        engine.generate(&mut spans, &RedactionPolicy::default()).await;

        assert!(spans[0].degraded);
    }

    #[tokio::test]
    async fn test_keyed_actions_are_deterministic() {
        let engine = ReplacementEngine::new(Arc::new(DownGenerator), GenerationLimits::default());
        let policy = RedactionPolicy::default();
        let mut a = vec![
            span("SSN", "123-45-6789", Action::Encrypt),
            span("Phone", "555-234-5678", Action::Rewrite),
        ];
        let mut b = a.clone();

        engine.generate(&mut a, &policy).await;
        engine.generate(&mut b, &policy).await;

        assert_eq!(a, b);
        assert!(a[0].replacement().unwrap().starts_with("ENC:"));
        assert_ne!(a[1].replacement(), Some("555-234-5678"));
        assert!(!a[1].degraded);
    }
}
