//! Generation orchestrator
//!
//! Drives one prompt from `pending` to `ready` or `error`: claim, parse,
//! run the backend, discover outputs, then record artifacts atomically.

use crate::config::MediaConfig;
use crate::db::Database;
use crate::error::{truncate_message, MediaError, Result, MAX_ERROR_MESSAGE_CHARS};
use crate::executor::backend::{GenerationBackend, GenerationRequest};
use crate::executor::pipeline::{MediaPipeline, Pipelines};
use crate::models::{
    ArtifactStatus, ArtifactType, EligibilityPolicy, NewArtifact, PromptRecord, PromptType,
};
use crate::repositories::{ArtifactRepository, PromptRepository};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// What happened to one prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Artifacts recorded and prompt marked `ready`
    Generated {
        artifact_ids: Vec<i64>,
        /// Stored relative paths
        files: Vec<String>,
    },
    /// Another worker had already claimed the prompt
    Skipped,
    /// Prompt marked `error` with this message
    Failed { message: String },
}

/// Tally of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `(prompt_id, message)` for every failure
    pub errors: Vec<(i64, String)>,
    /// Set when the eligible prompts could not be loaded at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Report for a batch that never started because its query failed
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self {
            query_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn record(&mut self, prompt_id: i64, outcome: &Result<GenerationOutcome>) {
        match outcome {
            Ok(GenerationOutcome::Generated { .. }) => self.succeeded += 1,
            Ok(GenerationOutcome::Skipped) => self.skipped += 1,
            Ok(GenerationOutcome::Failed { message }) => {
                self.failed += 1;
                self.errors.push((prompt_id, message.clone()));
            }
            Err(e) => {
                self.failed += 1;
                self.errors.push((prompt_id, e.to_string()));
            }
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        if self.query_error.is_none() {
            self.query_error = other.query_error;
        }
    }
}

/// Drives prompts through generation
#[derive(Clone)]
pub struct GenerationOrchestrator {
    prompts: PromptRepository,
    artifacts: ArtifactRepository,
    backend: Arc<dyn GenerationBackend>,
    pipelines: Pipelines,
    output_root: PathBuf,
    timeout: Duration,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("pipelines", &self.pipelines)
            .field("output_root", &self.output_root)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    pub fn new(
        prompts: PromptRepository,
        artifacts: ArtifactRepository,
        backend: Arc<dyn GenerationBackend>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prompts,
            artifacts,
            backend,
            pipelines: Pipelines::default(),
            output_root: output_root.into(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Wire repositories, pipelines and limits from configuration
    pub fn from_config(
        db: Arc<Database>,
        config: &MediaConfig,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        let policy = EligibilityPolicy {
            required_upstream_status: config.eligibility.required_upstream_status.clone(),
        };
        Self::new(
            PromptRepository::new(db.clone()).with_policy(policy),
            ArtifactRepository::new(db),
            backend,
            &config.engine.output_directory,
        )
        .with_pipelines(Pipelines::from_config(&config.workflows))
        .with_timeout(Duration::from_secs(config.engine.timeout_seconds))
    }

    /// Builder: set pipelines
    pub fn with_pipelines(mut self, pipelines: Pipelines) -> Self {
        self.pipelines = pipelines;
        self
    }

    /// Builder: set the backend time budget per prompt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prompts(&self) -> &PromptRepository {
        &self.prompts
    }

    pub fn artifacts(&self) -> &ArtifactRepository {
        &self.artifacts
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Generate media for one prompt.
    ///
    /// Generation failures are recorded on the prompt and returned as
    /// [`GenerationOutcome::Failed`]; only database errors while recording
    /// that failure surface as `Err`.
    pub async fn generate(&self, prompt: &PromptRecord) -> Result<GenerationOutcome> {
        if !self.prompts.claim(prompt.id).await? {
            info!(prompt_id = prompt.id, "Prompt already claimed, skipping");
            return Ok(GenerationOutcome::Skipped);
        }

        let result = match self.produce(prompt).await {
            Ok(artifacts) => self
                .artifacts
                .save_artifacts_atomic(prompt.id, &artifacts, ArtifactStatus::Ready)
                .await
                .map(|ids| (ids, artifacts)),
            Err(e) => Err(e),
        };

        match result {
            Ok((artifact_ids, artifacts)) => {
                info!(
                    prompt_id = prompt.id,
                    prompt_type = %prompt.prompt_type,
                    count = artifact_ids.len(),
                    "Generation complete"
                );
                Ok(GenerationOutcome::Generated {
                    artifact_ids,
                    files: artifacts.into_iter().map(|a| a.file_path).collect(),
                })
            }
            Err(e) => {
                let message = truncate_message(&e.to_string(), MAX_ERROR_MESSAGE_CHARS);
                error!(
                    prompt_id = prompt.id,
                    prompt_type = %prompt.prompt_type,
                    error = %message,
                    "Generation failed"
                );
                self.prompts
                    .set_artifact_status(prompt.id, ArtifactStatus::Error, Some(&message))
                    .await?;
                Ok(GenerationOutcome::Failed { message })
            }
        }
    }

    async fn produce(&self, prompt: &PromptRecord) -> Result<Vec<NewArtifact>> {
        let pipeline = self.pipelines.for_type(prompt.prompt_type);
        let content = prompt.primary_content().ok_or_else(|| {
            MediaError::payload(format!("prompt {} has no {} content", prompt.id, prompt.prompt_type))
        })?;

        let payload = pipeline.parse(&content.content)?;
        let arguments = pipeline.engine_arguments(&payload)?;
        let output_dir = self.create_output_dir(prompt.id, pipeline.artifact_type()).await?;

        self.backend
            .generate(&GenerationRequest {
                prompt_id: prompt.id,
                prompt_type: prompt.prompt_type,
                arguments,
                output_dir: output_dir.clone(),
                timeout: self.timeout,
            })
            .await?;

        let files = discover_outputs(pipeline, &output_dir).await?;
        if files.is_empty() {
            return Err(MediaError::generation(format!(
                "No {} files generated in {}. Check ComfyUI output and workflow script.",
                pipeline.output_extensions().join("/"),
                output_dir.display()
            )));
        }

        let mut artifacts = Vec::with_capacity(files.len());
        for (file, size) in files {
            let relative = relative_path(&self.output_root, &file)?;
            let mut artifact = NewArtifact::new(prompt.id, pipeline.artifact_type(), &relative)
                .with_metadata(pipeline.artifact_metadata(&payload, &file, size));
            if pipeline.has_preview() {
                artifact = artifact.with_preview(relative);
            }
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    async fn create_output_dir(&self, prompt_id: i64, artifact_type: ArtifactType) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%dT%H%M%S");
        let dir = self
            .output_root
            .join(artifact_type.as_str())
            .join(format!("{}_{}", prompt_id, stamp));
        tokio::fs::create_dir_all(&dir).await?;
        debug!(prompt_id, dir = %dir.display(), "Created output directory");
        Ok(dir)
    }

    /// Generate each prompt in turn. Never aborts on a single failure.
    pub async fn run_prompts(&self, prompts: &[PromptRecord]) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, prompt) in prompts.iter().enumerate() {
            info!(
                prompt_id = prompt.id,
                position = index + 1,
                total = prompts.len(),
                "Processing prompt"
            );
            let outcome = self.generate(prompt).await;
            if let Err(e) = &outcome {
                error!(prompt_id = prompt.id, error = %e, "Error processing prompt");
            }
            report.record(prompt.id, &outcome);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Batch complete"
        );
        report
    }

    /// Generate up to `limit` eligible prompts of one type, oldest first
    pub async fn run_pending(&self, prompt_type: PromptType, limit: u32) -> Result<BatchReport> {
        let prompts = self.prompts.find_eligible(prompt_type, limit).await?;
        if prompts.is_empty() {
            debug!(prompt_type = %prompt_type, "No eligible prompts");
            return Ok(BatchReport::default());
        }

        info!(prompt_type = %prompt_type, count = prompts.len(), "Found eligible prompts");
        Ok(self.run_prompts(&prompts).await)
    }
}

/// Files in `dir` the pipeline recognises, with sizes, sorted by file name
async fn discover_outputs(pipeline: &dyn MediaPipeline, dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = entry.metadata().await?;
        if meta.is_file() && pipeline.accepts(&path) {
            files.push((path, meta.len()));
        }
    }

    files.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(files)
}

/// `file` relative to `root`, `/` separated
fn relative_path(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        MediaError::Other(format!(
            "{} is outside the output directory {}",
            file.display(),
            root.display()
        ))
    })?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/media/out");
        let file = root.join("image").join("7_20260101T000000").join("out.png");
        assert_eq!(
            relative_path(root, &file).unwrap(),
            "image/7_20260101T000000/out.png"
        );
        assert!(relative_path(root, Path::new("/elsewhere/x.png")).is_err());
    }

    #[test]
    fn test_batch_report_tally() {
        let mut report = BatchReport::default();
        report.record(
            1,
            &Ok(GenerationOutcome::Generated {
                artifact_ids: vec![1],
                files: vec!["a.png".into()],
            }),
        );
        report.record(2, &Ok(GenerationOutcome::Skipped));
        report.record(
            3,
            &Ok(GenerationOutcome::Failed {
                message: "boom".into(),
            }),
        );
        report.record(4, &Err(MediaError::Database("locked".into())));

        assert_eq!(report.total(), 4);
        assert_eq!((report.succeeded, report.failed, report.skipped), (1, 2, 1));
        assert_eq!(report.errors[0], (3, "boom".to_string()));
    }

    #[tokio::test]
    async fn test_discover_outputs_sorted_and_filtered() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.png", "a.png", "notes.txt", "c.PNG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let pipelines = Pipelines::default();
        let files = discover_outputs(pipelines.for_type(PromptType::Image), dir.path())
            .await
            .unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a.png", "b.png", "c.PNG"]);
    }
}
