//! Asynchronous job layer.
//!
//! A job is submitted with the PDF bytes and returns an id at once; the
//! pipeline runs on a tokio task and pushes its progress into the job
//! record. Artifacts are written under `<root>/<job_id>/`. The registry is
//! the only place job state is kept.

use crate::config::{RedactionPolicy, TextRedactionMode, VisualRedactionMode};
use crate::pipeline::{JobStage, PipelineOutput, RedactionPipeline};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, Instrument};

/// Client-side errors of the job API.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("unknown artifact '{0}' (expected redacted, overlay or log)")]
    UnknownArtifact(String),

    #[error("artifact '{artifact}' is not available for job '{job_id}'")]
    NotReady { job_id: String, artifact: String },

    #[error("invalid value for {parameter}: {reason}")]
    InvalidPolicy { parameter: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl JobError {
    /// True for errors caused by the caller's request.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

/// Files a job can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Redacted,
    Overlay,
    Log,
}

impl Artifact {
    pub fn file_name(&self, job_id: &str) -> String {
        match self {
            Self::Redacted => format!("{}_redacted.pdf", job_id),
            Self::Overlay => format!("{}_overlay.pdf", job_id),
            Self::Log => format!("{}_log.json", job_id),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Redacted | Self::Overlay => "application/pdf",
            Self::Log => "application/json",
        }
    }
}

impl FromStr for Artifact {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redacted" => Ok(Self::Redacted),
            "overlay" => Ok(Self::Overlay),
            "log" => Ok(Self::Log),
            other => Err(JobError::UnknownArtifact(other.to_string())),
        }
    }
}

/// Options accepted at submission, as raw strings from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitOptions {
    pub text_redaction_mode: Option<String>,
    pub visual_redaction_mode: Option<String>,
    pub create_overlay_pdf: Option<bool>,
}

impl SubmitOptions {
    /// Applies the options to `base`, rejecting unknown values.
    pub fn to_policy(&self, base: &RedactionPolicy) -> Result<RedactionPolicy, JobError> {
        let mut policy = base.clone();
        if let Some(mode) = &self.text_redaction_mode {
            let mode = TextRedactionMode::from_str(mode).map_err(|e| JobError::InvalidPolicy {
                parameter: "text_redaction_mode".to_string(),
                reason: e.to_string(),
            })?;
            policy = policy.with_text_mode(mode);
        }
        if let Some(mode) = &self.visual_redaction_mode {
            let mode = VisualRedactionMode::from_str(mode).map_err(|e| JobError::InvalidPolicy {
                parameter: "visual_redaction_mode".to_string(),
                reason: e.to_string(),
            })?;
            policy = policy.with_visual_mode(mode);
        }
        if let Some(overlay) = self.create_overlay_pdf {
            policy = policy.with_overlay(overlay);
        }
        Ok(policy)
    }
}

/// Coarse state of a job as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as returned by [`JobRegistry::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    /// Latest pipeline stage; for a failed job, the stage it could not reach
    pub stage: JobStage,
    pub progress: u8,
    pub message: String,
    pub result_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub filename: String,
}

/// A fetched artifact.
#[derive(Debug, Clone)]
pub struct ArtifactData {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Concurrency-safe job map plus the shared pipeline.
pub struct JobRegistry {
    jobs: DashMap<String, JobStatus>,
    root: PathBuf,
    pipeline: Arc<RedactionPipeline>,
    base_policy: RedactionPolicy,
}

impl JobRegistry {
    pub fn new(root: impl Into<PathBuf>, pipeline: Arc<RedactionPipeline>) -> Self {
        Self {
            jobs: DashMap::new(),
            root: root.into(),
            pipeline,
            base_policy: RedactionPolicy::default(),
        }
    }

    /// Policy that submission options are applied on top of.
    pub fn with_base_policy(mut self, policy: RedactionPolicy) -> Self {
        self.base_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Registers a job and starts it; returns the job id immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        filename: &str,
        options: SubmitOptions,
    ) -> Result<String, JobError> {
        let policy = options.to_policy(&self.base_policy)?;
        let job_id = format!("job_{}", uuid::Uuid::new_v4().simple());
        let filename = if filename.trim().is_empty() {
            "document.pdf".to_string()
        } else {
            filename.to_string()
        };

        self.jobs.insert(
            job_id.clone(),
            JobStatus {
                job_id: job_id.clone(),
                status: JobState::Uploaded,
                stage: JobStage::Received,
                progress: 0,
                message: "queued".to_string(),
                result_files: Vec::new(),
                error: None,
                filename: filename.clone(),
            },
        );
        info!(job_id = %job_id, filename = %filename, bytes = bytes.len(), "job submitted");

        let registry = Arc::clone(self);
        let id = job_id.clone();
        let span = tracing::info_span!("job", job_id = %job_id);
        tokio::spawn(
            async move {
                registry.execute(&id, bytes, &filename, policy).await;
            }
            .instrument(span),
        );

        Ok(job_id)
    }

    async fn execute(&self, job_id: &str, bytes: Vec<u8>, filename: &str, policy: RedactionPolicy) {
        // Completion is recorded only once the artifacts are on disk.
        let reporter = |stage: JobStage, progress: u8, message: &str| {
            if stage == JobStage::Completed {
                return;
            }
            self.update(job_id, |job| {
                job.status = JobState::Processing;
                job.stage = stage;
                job.progress = progress;
                job.message = message.to_string();
            });
        };

        let result = self
            .pipeline
            .run(Arc::new(bytes), filename, &policy, &reporter)
            .await;

        match result {
            Ok(output) => match self.persist(job_id, &output).await {
                Ok(files) => self.update(job_id, |job| {
                    job.status = JobState::Completed;
                    job.stage = JobStage::Completed;
                    job.progress = 100;
                    job.message = "completed".to_string();
                    job.result_files = files;
                }),
                Err(e) => {
                    error!(job_id, error = %e, "failed to write artifacts");
                    self.fail(job_id, JobStage::Completed, e.to_string());
                }
            },
            Err(failure) => {
                error!(job_id, stage = %failure.stage, error = %failure.error, "job failed");
                self.fail(job_id, failure.stage, failure.error.to_string());
            }
        }
    }

    async fn persist(&self, job_id: &str, output: &PipelineOutput) -> std::io::Result<Vec<String>> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let log = output
            .log
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut artifacts = vec![(Artifact::Redacted, output.redacted.as_slice())];
        if let Some(overlay) = &output.overlay {
            artifacts.push((Artifact::Overlay, overlay.as_slice()));
        }
        artifacts.push((Artifact::Log, log.as_slice()));

        let mut files = Vec::with_capacity(artifacts.len());
        for (artifact, bytes) in artifacts {
            let name = artifact.file_name(job_id);
            tokio::fs::write(dir.join(&name), bytes).await?;
            files.push(name);
        }
        Ok(files)
    }

    fn fail(&self, job_id: &str, stage: JobStage, message: String) {
        self.update(job_id, |job| {
            job.status = JobState::Failed;
            job.stage = stage;
            job.message = format!("failed at {}", stage);
            job.error = Some(message);
            job.result_files.clear();
        });
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut JobStatus)) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            f(job.value_mut());
        }
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        self.jobs
            .get(job_id)
            .map(|job| job.value().clone())
            .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))
    }

    /// All jobs, oldest id first.
    pub fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<JobStatus> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        jobs
    }

    /// Reads one artifact of a job.
    pub async fn fetch(&self, job_id: &str, key: &str) -> Result<ArtifactData, JobError> {
        let status = self.status(job_id)?;
        let artifact = Artifact::from_str(key)?;
        let file_name = artifact.file_name(job_id);

        if !status.result_files.contains(&file_name) {
            return Err(JobError::NotReady {
                job_id: job_id.to_string(),
                artifact: key.to_string(),
            });
        }

        let bytes = tokio::fs::read(self.job_dir(job_id).join(&file_name)).await?;
        Ok(ArtifactData {
            file_name,
            content_type: artifact.content_type(),
            bytes,
        })
    }

    /// Removes a job record and its files.
    pub async fn delete(&self, job_id: &str) -> Result<(), JobError> {
        self.jobs
            .remove(job_id)
            .ok_or_else(|| JobError::UnknownJob(job_id.to_string()))?;

        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(Artifact::Redacted.file_name("job_1"), "job_1_redacted.pdf");
        assert_eq!(Artifact::Log.content_type(), "application/json");
        assert!(matches!(
            Artifact::from_str("thumbnail"),
            Err(JobError::UnknownArtifact(_))
        ));
    }

    #[test]
    fn test_options_reject_unknown_modes() {
        let options = SubmitOptions {
            text_redaction_mode: Some("shred".to_string()),
            ..Default::default()
        };
        let err = options.to_policy(&RedactionPolicy::default()).unwrap_err();
        assert!(matches!(err, JobError::InvalidPolicy { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_options_apply_over_base() {
        let options = SubmitOptions {
            text_redaction_mode: Some("anonymize".to_string()),
            visual_redaction_mode: Some("replacement".to_string()),
            create_overlay_pdf: Some(false),
        };
        let policy = options.to_policy(&RedactionPolicy::default()).unwrap();
        assert_eq!(policy.text_redaction_mode, TextRedactionMode::Anonymize);
        assert_eq!(policy.visual_redaction_mode, VisualRedactionMode::Replacement);
        assert!(!policy.create_overlay);
    }

    #[test]
    fn test_status_serializes_coarse_state_and_stage() {
        let status = JobStatus {
            job_id: "job_1".to_string(),
            status: JobState::Processing,
            stage: JobStage::ReplacementsGenerated,
            progress: 37,
            message: "replacements generated".to_string(),
            result_files: Vec::new(),
            error: None,
            filename: "intake.pdf".to_string(),
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "processing");
        assert_eq!(value["stage"], "replacements_generated");
        assert!(value.get("error").is_none());
        assert!(!JobState::Uploaded.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path(), Arc::new(RedactionPipeline::default()));
        assert!(matches!(registry.status("job_nope"), Err(JobError::UnknownJob(_))));
        assert!(matches!(
            registry.fetch("job_nope", "log").await,
            Err(JobError::UnknownJob(_))
        ));
        assert!(registry.delete("job_nope").await.is_err());
    }
}
