//! Common test utilities and setup

#![allow(dead_code)]

use async_trait::async_trait;
use mediagen::executor::{GenerationBackend, GenerationRequest};
use mediagen::{
    ArtifactRepository, Database, GenerationOrchestrator, MediaError, PromptRepository, PromptType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub const IMAGE_CONTENT: &str = r#"{
    "prompt": "a red fox in the snow",
    "negative_prompt": "blurry",
    "style_tags": ["watercolor"],
    "technical_params": {"aspect_ratio": "1:1", "quality": "high", "mood": "calm"}
}"#;

pub const LYRICS_CONTENT: &str = r#"{
    "title": "Northern Lights",
    "genre": "synthpop",
    "mood": "hopeful",
    "tempo": "120 bpm",
    "structure": [
        {"type": "verse", "number": 1, "lyrics": "Cold air, bright sky"},
        {"type": "chorus", "lyrics": "We glow"}
    ],
    "metadata": {"key": "A minor", "vocal_style": "airy", "instrumentation": ["synth", "drums"]}
}"#;

/// Create a migrated test database with a unique name
pub async fn setup_test_db() -> (TempDir, Arc<Database>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = temp_dir.path().join(format!("test_{}.db", counter));

    let db = Database::initialize(&db_path)
        .await
        .expect("Failed to create test database");

    (temp_dir, Arc::new(db))
}

/// Insert a prompt with explicit fields. Returns its id.
pub async fn insert_prompt(
    db: &Database,
    prompt_type: &str,
    upstream_status: &str,
    created_at: i64,
) -> i64 {
    sqlx::query(
        "INSERT INTO prompts (prompt_text, prompt_type, status, artifact_status, created_at)
         VALUES ('test prompt', ?, ?, 'pending', ?)",
    )
    .bind(prompt_type)
    .bind(upstream_status)
    .bind(created_at)
    .execute(db.pool())
    .await
    .expect("Failed to insert prompt")
    .last_insert_rowid()
}

/// Insert a content record and link it to `prompt_id`. Returns the content id.
pub async fn attach_content(
    db: &Database,
    prompt_id: i64,
    content_type: &str,
    content: &str,
    position: i64,
) -> i64 {
    let writing_id = sqlx::query(
        "INSERT INTO writings (content, content_type, title) VALUES (?, ?, 'Test title')",
    )
    .bind(content)
    .bind(content_type)
    .execute(db.pool())
    .await
    .expect("Failed to insert content")
    .last_insert_rowid();

    sqlx::query("INSERT INTO prompt_writings (prompt_id, writing_id, position) VALUES (?, ?, ?)")
        .bind(prompt_id)
        .bind(writing_id)
        .bind(position)
        .execute(db.pool())
        .await
        .expect("Failed to link content");

    writing_id
}

/// A completed prompt of `prompt_type` with one valid content record
pub async fn seed_prompt(db: &Database, prompt_type: PromptType, created_at: i64) -> i64 {
    let content = match prompt_type {
        PromptType::Image => IMAGE_CONTENT,
        PromptType::Lyrics => LYRICS_CONTENT,
    };
    let id = insert_prompt(db, prompt_type.as_str(), "completed", created_at).await;
    attach_content(db, id, prompt_type.as_str(), content, 0).await;
    id
}

/// Raw `(artifact_status, error_message, processing_started_at)` of a prompt
pub async fn prompt_state(db: &Database, prompt_id: i64) -> (String, Option<String>, Option<i64>) {
    sqlx::query_as(
        "SELECT artifact_status, error_message, processing_started_at FROM prompts WHERE id = ?",
    )
    .bind(prompt_id)
    .fetch_one(db.pool())
    .await
    .expect("Failed to read prompt state")
}

pub async fn set_raw_status(db: &Database, prompt_id: i64, status: &str, started_at: Option<i64>) {
    sqlx::query(
        "UPDATE prompts SET artifact_status = ?, processing_started_at = ? WHERE id = ?",
    )
    .bind(status)
    .bind(started_at)
    .bind(prompt_id)
    .execute(db.pool())
    .await
    .expect("Failed to set prompt status");
}

pub async fn artifact_count(db: &Database, prompt_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM artifacts WHERE prompt_id = ?")
        .bind(prompt_id)
        .fetch_one(db.pool())
        .await
        .expect("Failed to count artifacts")
}

/// Orchestrator over `db` writing under `<temp_dir>/output`
pub fn orchestrator(
    temp_dir: &TempDir,
    db: Arc<Database>,
    backend: Arc<dyn GenerationBackend>,
) -> GenerationOrchestrator {
    GenerationOrchestrator::new(
        PromptRepository::new(db.clone()),
        ArtifactRepository::new(db),
        backend,
        temp_dir.path().join("output"),
    )
}

/// Writes the given file names into the output directory and records requests
#[derive(Debug, Default)]
pub struct FileWritingBackend {
    files: Vec<String>,
    delay: Option<Duration>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FileWritingBackend {
    pub fn new(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationBackend for FileWritingBackend {
    async fn generate(&self, request: &GenerationRequest) -> mediagen::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        for file in &self.files {
            tokio::fs::write(request.output_dir.join(file), b"media").await?;
        }
        Ok(())
    }
}

/// Always fails with a fixed message
#[derive(Debug)]
pub struct FailingBackend {
    pub message: String,
}

impl FailingBackend {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl GenerationBackend for FailingBackend {
    async fn generate(&self, _request: &GenerationRequest) -> mediagen::Result<()> {
        Err(MediaError::generation(self.message.clone()))
    }
}
