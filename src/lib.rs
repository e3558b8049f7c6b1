//! PII/PHI detection and redaction for PDF documents.
//!
//! This library finds personally identifiable and protected health
//! information in a PDF, replaces each instance according to a policy, and
//! produces a redacted copy, an optional audit overlay and a JSON log.
//!
//! # Features
//!
//! - **Structured parsing**: text lines with per-glyph boxes and image blocks via MuPDF
//! - **Pluggable detection**: pattern rules, literal terms, or any [`detection::Detector`]
//! - **Policy-driven replacement**: anonymize, synthetic dummy values, format-preserving rewrite, keyed tokens
//! - **Additive redaction**: covers and replacements are drawn over the original pages
//! - **Audit trail**: colour-coded overlay PDF and a per-span JSON log
//! - **Job service**: asynchronous submit/status/fetch over an in-process registry or HTTP
//!
//! # Architecture
//!
//! - [`pdf`]: parsing, reference layout and coordinate mapping
//! - [`detection`]: detection passes and overlap resolution
//! - [`replacement`]: replacement generation, caching and fallbacks
//! - [`redaction`]: redacted output, overlay and log
//! - [`pipeline`]: the staged run for one document
//! - [`jobs`] and [`server`]: job registry and HTTP API
//! - [`config`] and [`error`]: policy and error types
//!
//! # Quick Start
//!
//! ```no_run
//! use phi_redactor::{NoProgress, RedactionPipeline, RedactionPolicy};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = RedactionPipeline::default();
//! let bytes = std::fs::read("record.pdf")?;
//!
//! let output = pipeline
//!     .run(Arc::new(bytes), "record.pdf", &RedactionPolicy::default(), &NoProgress)
//!     .await?;
//!
//! std::fs::write("record_redacted.pdf", &output.redacted)?;
//! println!("{} redaction(s)", output.log.metrics.total_redactions);
//! # Ok(())
//! # }
//! ```
//!
//! # Pattern Matching
//!
//! ```
//! use phi_redactor::domain::{PatternMatcher, PhoneNumberMatcher};
//!
//! let matcher = PhoneNumberMatcher::new();
//! let text = "Call (555) 234-5678 or 555-987-6543";
//! assert_eq!(matcher.extract_all(text).len(), 2);
//! ```

pub mod config;
pub mod detection;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod pdf;
pub mod pipeline;
pub mod redaction;
pub mod replacement;
pub mod server;

pub use config::{Action, RedactionPolicy, TextRedactionMode, VisualRedactionMode};
pub use detection::{DetectionEngine, Detector, LiteralDetector, PatternDetector};
pub use domain::{BBox, DocumentElement, ParsedDocument, PiiSpan};
pub use error::{RedactorError, RedactorResult};
pub use jobs::{JobError, JobRegistry, JobState, JobStatus, SubmitOptions};
pub use pipeline::{JobStage, NoProgress, PipelineOutput, ProgressReporter, RedactionPipeline};
pub use redaction::{OverlayBuilder, RedactionEngine, RedactionLog};
pub use replacement::{FallbackGenerator, GenerationLimits, Generator, GeneratorError};

/// Extracts the plain text of a PDF file.
pub fn extract_text_from_pdf(path: &std::path::Path) -> RedactorResult<String> {
    pdf::extract_text_from_file(path)
}
