//! The redaction pipeline for one document.
//!
//! Stages run strictly in order: parse, detect, generate replacements, map
//! coordinates, redact, build the overlay. The first fatal error stops the
//! run and is reported with the stage it happened in. MuPDF and lopdf work
//! runs on the blocking pool; replacement generation is async.

use crate::config::RedactionPolicy;
use crate::detection::visual::{self, ImageClassifier};
use crate::detection::DetectionEngine;
use crate::domain::{ParsedDocument, PiiSpan};
use crate::error::{RedactorError, RedactorResult};
use crate::pdf::{self, CoordinateMapper};
use crate::redaction::{OverlayBuilder, RedactionEngine, RedactionLog, RedactionSummary};
use crate::replacement::{FallbackGenerator, GenerationLimits, Generator, ReplacementEngine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Received,
    Parsed,
    Detected,
    ReplacementsGenerated,
    Mapped,
    Redacted,
    OverlayBuilt,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::Detected => "detected",
            Self::ReplacementsGenerated => "replacements_generated",
            Self::Mapped => "mapped",
            Self::Redacted => "redacted",
            Self::OverlayBuilt => "overlay_built",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight progress steps of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Parse,
    Detect,
    Generate,
    TextPdf,
    Map,
    Redact,
    Save,
    Overlay,
}

impl Step {
    pub const COUNT: u32 = 8;

    fn ordinal(&self) -> u32 {
        match self {
            Self::Parse => 1,
            Self::Detect => 2,
            Self::Generate => 3,
            Self::TextPdf => 4,
            Self::Map => 5,
            Self::Redact => 6,
            Self::Save => 7,
            Self::Overlay => 8,
        }
    }

    /// Percentage reached once this step is done, rounded down.
    pub fn progress(&self) -> u8 {
        (self.ordinal() * 100 / Self::COUNT) as u8
    }
}

/// Receives stage transitions and progress from a running pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, stage: JobStage, progress: u8, message: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(JobStage, u8, &str) + Send + Sync,
{
    fn report(&self, stage: JobStage, progress: u8, message: &str) {
        self(stage, progress, message)
    }
}

/// Reporter that discards everything.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _stage: JobStage, _progress: u8, _message: &str) {}
}

/// A fatal error and the stage that could not be reached.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: JobStage,
    pub error: RedactorError,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed at stage {}: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

trait AtStage<T> {
    fn at(self, stage: JobStage) -> Result<T, StageFailure>;
}

impl<T> AtStage<T> for RedactorResult<T> {
    fn at(self, stage: JobStage) -> Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub redacted: Vec<u8>,
    pub overlay: Option<Vec<u8>>,
    pub log: RedactionLog,
    pub summary: RedactionSummary,
}

/// Wires the stage components together.
pub struct RedactionPipeline {
    detection: Arc<DetectionEngine>,
    replacement: ReplacementEngine,
    mapper: CoordinateMapper,
    redaction: RedactionEngine,
    overlay: OverlayBuilder,
    classifier: Option<Arc<dyn ImageClassifier>>,
}

impl RedactionPipeline {
    pub fn new(detection: DetectionEngine, generator: Arc<dyn Generator>, limits: GenerationLimits) -> Self {
        Self {
            detection: Arc::new(detection),
            replacement: ReplacementEngine::new(generator, limits),
            mapper: CoordinateMapper::new(),
            redaction: RedactionEngine::new(),
            overlay: OverlayBuilder::new(),
            classifier: None,
        }
    }

    /// Labels image elements with `classifier` before they are redacted.
    pub fn with_image_classifier(mut self, classifier: Arc<dyn ImageClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_mapper(mut self, mapper: CoordinateMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn generator_name(&self) -> &str {
        self.replacement.generator_name()
    }

    /// True if some detection pass can report `pii_type`.
    pub fn detects(&self, pii_type: &str) -> bool {
        self.detection.covers(pii_type)
    }

    /// Runs every stage on `input`.
    ///
    /// # Arguments
    /// * `input` - PDF bytes
    /// * `input_name` - Name recorded in the log
    /// * `policy` - Redaction policy for this run
    /// * `progress` - Receives each stage transition
    #[instrument(skip_all, fields(input = input_name))]
    pub async fn run(
        &self,
        input: Arc<Vec<u8>>,
        input_name: &str,
        policy: &RedactionPolicy,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutput, StageFailure> {
        progress.report(JobStage::Received, 0, "received");

        let bytes = Arc::clone(&input);
        let document: Arc<ParsedDocument> = Arc::new(
            blocking(move || pdf::parse(&bytes))
                .await
                .at(JobStage::Parsed)?,
        );
        progress.report(
            JobStage::Parsed,
            Step::Parse.progress(),
            &format!("parsed {} page(s)", document.page_count()),
        );

        let engine = Arc::clone(&self.detection);
        let doc = Arc::clone(&document);
        let detect_policy = policy.clone();
        let mut spans: Vec<PiiSpan> = blocking(move || engine.detect(&doc, &detect_policy))
            .await
            .at(JobStage::Detected)?;
        progress.report(
            JobStage::Detected,
            Step::Detect.progress(),
            &format!("detected {} span(s)", spans.len()),
        );

        self.replacement.generate(&mut spans, policy).await;
        progress.report(
            JobStage::ReplacementsGenerated,
            Step::Generate.progress(),
            "replacements generated",
        );

        let needs_layout = spans.iter().any(|s| {
            document
                .elements
                .get(s.element_index)
                .and_then(|e| e.glyph_span(&s.range))
                .is_none()
        });
        let layout = if needs_layout {
            let doc = Arc::clone(&document);
            match blocking(move || pdf::render_reference_layout(&doc)).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(error = %e, "reference layout unavailable");
                    None
                }
            }
        } else {
            None
        };
        progress.report(
            JobStage::ReplacementsGenerated,
            Step::TextPdf.progress(),
            "reference layout ready",
        );

        let mapper = self.mapper.clone();
        let doc = Arc::clone(&document);
        let spans: Vec<PiiSpan> = blocking(move || {
            let mut spans = spans;
            mapper.map(&doc, &mut spans, layout.as_deref());
            Ok(spans)
        })
        .await
        .at(JobStage::Mapped)?;
        progress.report(JobStage::Mapped, Step::Map.progress(), "coordinates mapped");

        let spans = Arc::new(spans);
        let mut images = document.image_elements();
        if let Some(classifier) = self.classifier.clone() {
            if !images.is_empty() {
                let bytes = Arc::clone(&input);
                images = blocking(move || {
                    visual::label_images(classifier.as_ref(), &bytes, &mut images);
                    Ok(images)
                })
                .await
                .at(JobStage::Redacted)?;
            }
        }
        let images = Arc::new(images);
        let mode = policy.visual_redaction_mode;

        let engine = self.redaction.clone();
        let (bytes, s, i) = (Arc::clone(&input), Arc::clone(&spans), Arc::clone(&images));
        let stamped = blocking(move || engine.stamp(&bytes, &s, &i, mode))
            .await
            .at(JobStage::Redacted)?;
        let summary = stamped.summary.clone();
        progress.report(
            JobStage::Mapped,
            Step::Redact.progress(),
            &format!("{} span(s) drawn", summary.spans_applied),
        );

        let engine = self.redaction.clone();
        let bytes = Arc::clone(&input);
        let redacted = blocking(move || engine.encode(&bytes, stamped))
            .await
            .at(JobStage::Redacted)?;
        progress.report(JobStage::Redacted, Step::Save.progress(), "redacted document saved");

        let overlay = if policy.create_overlay {
            let builder = self.overlay.clone();
            let (bytes, s, i) = (Arc::clone(&input), Arc::clone(&spans), Arc::clone(&images));
            let overlay = blocking(move || builder.build(&bytes, &s, &i, mode))
                .await
                .at(JobStage::OverlayBuilt)?;
            progress.report(JobStage::OverlayBuilt, Step::Overlay.progress(), "overlay built");
            Some(overlay)
        } else {
            progress.report(JobStage::Redacted, Step::Overlay.progress(), "overlay skipped");
            None
        };

        let log = RedactionLog::build(input_name, &spans, images.len());
        info!(
            redactions = log.metrics.total_redactions,
            unresolved = log.metrics.unresolved_locations,
            degraded = log.metrics.degraded_replacements,
            visual = log.metrics.total_visual_elements,
            "pipeline completed"
        );
        progress.report(JobStage::Completed, 100, "completed");

        Ok(PipelineOutput {
            redacted,
            overlay,
            log,
            summary,
        })
    }
}

impl Default for RedactionPipeline {
    fn default() -> Self {
        Self::new(
            DetectionEngine::with_builtin_rules(),
            Arc::new(FallbackGenerator::new()),
            GenerationLimits::default(),
        )
    }
}

async fn blocking<T, F>(f: F) -> RedactorResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> RedactorResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        RedactorError::backend("tokio", format!("blocking task failed: {}", e), Some(Box::new(e)))
    })?
}
