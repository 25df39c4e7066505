//! Artifact repository for database operations

use crate::db::{CheckpointMode, Database};
use crate::error::{MediaError, Result};
use crate::models::{ArtifactRecord, ArtifactStatus, ArtifactType, NewArtifact};
use crate::repositories::prompt_repository::update_status_on;
use crate::repositories::timestamp;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, info};

const ARTIFACT_COLUMNS: &str =
    "id, prompt_id, artifact_type, file_path, preview_path, metadata, created_at, updated_at";

/// Repository for artifact database operations
#[derive(Clone, Debug)]
pub struct ArtifactRepository {
    db: Arc<Database>,
}

impl ArtifactRepository {
    /// Create a new artifact repository
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a single artifact. Returns the new artifact id.
    pub async fn save_artifact(&self, artifact: &NewArtifact) -> Result<i64> {
        let artifact = artifact.clone();
        let now = timestamp::storage_timestamp(Utc::now());

        let id = self
            .db
            .transactions()
            .immediate(move |conn| Box::pin(async move { insert_on(&mut *conn, &artifact, &now).await }))
            .await?;

        debug!(artifact_id = id, "Artifact saved");
        self.db.transactions().checkpoint(CheckpointMode::Passive).await;
        Ok(id)
    }

    /// Record every artifact of a generation and move the prompt to
    /// `final_status` in one transaction. Either all rows land or none do.
    ///
    /// An empty batch only moves the prompt.
    pub async fn save_artifacts_atomic(
        &self,
        prompt_id: i64,
        artifacts: &[NewArtifact],
        final_status: ArtifactStatus,
    ) -> Result<Vec<i64>> {
        if let Some(stray) = artifacts.iter().find(|a| a.prompt_id != prompt_id) {
            return Err(MediaError::Other(format!(
                "Artifact for prompt {} cannot be saved under prompt {}",
                stray.prompt_id, prompt_id
            )));
        }

        let batch = artifacts.to_vec();
        let now = timestamp::storage_timestamp(Utc::now());

        let ids = self
            .db
            .transactions()
            .immediate(move |conn| {
                Box::pin(async move {
                    update_status_on(&mut *conn, prompt_id, final_status, None).await?;

                    let mut ids = Vec::with_capacity(batch.len());
                    for artifact in &batch {
                        ids.push(insert_on(&mut *conn, artifact, &now).await?);
                    }
                    Ok(ids)
                })
            })
            .await?;

        info!(
            prompt_id,
            count = ids.len(),
            to = %final_status,
            "Artifacts recorded"
        );
        self.db.transactions().checkpoint(CheckpointMode::Restart).await;
        Ok(ids)
    }

    /// Artifacts of one prompt, newest first
    pub async fn get_for_prompt(&self, prompt_id: i64) -> Result<Vec<ArtifactRecord>> {
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS}
             FROM artifacts
             WHERE prompt_id = ?
             ORDER BY {} DESC, id DESC",
            timestamp::order_key("created_at")
        );
        let rows = sqlx::query(&sql)
            .bind(prompt_id)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| MediaError::Database(format!("Failed to load artifacts: {}", e)))?;

        rows.iter().map(artifact_from_row).collect()
    }

    /// Newest artifacts of one type across all prompts
    pub async fn list_recent(&self, artifact_type: ArtifactType, limit: u32) -> Result<Vec<ArtifactRecord>> {
        let sql = format!(
            "SELECT {ARTIFACT_COLUMNS}
             FROM artifacts
             WHERE artifact_type = ?
             ORDER BY {} DESC, id DESC
             LIMIT ?",
            timestamp::order_key("created_at")
        );
        let rows = sqlx::query(&sql)
            .bind(artifact_type.as_str())
            .bind(i64::from(limit))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| MediaError::Database(format!("Failed to list artifacts: {}", e)))?;

        rows.iter().map(artifact_from_row).collect()
    }
}

async fn insert_on(conn: &mut SqliteConnection, artifact: &NewArtifact, now: &str) -> Result<i64> {
    let metadata = serde_json::to_string(&artifact.metadata)?;

    let done = sqlx::query(
        "INSERT INTO artifacts (prompt_id, artifact_type, file_path, preview_path, metadata, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(artifact.prompt_id)
    .bind(artifact.artifact_type.as_str())
    .bind(&artifact.file_path)
    .bind(&artifact.preview_path)
    .bind(metadata)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| MediaError::Database(format!("Failed to save artifact: {}", e)))?;

    Ok(done.last_insert_rowid())
}

fn artifact_from_row(row: &SqliteRow) -> Result<ArtifactRecord> {
    let artifact_type: String = row.try_get("artifact_type")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(ArtifactRecord {
        id: row.try_get("id")?,
        prompt_id: row.try_get("prompt_id")?,
        artifact_type: ArtifactType::parse(&artifact_type).ok_or_else(|| {
            MediaError::Database(format!("Unknown artifact type '{}'", artifact_type))
        })?,
        file_path: row.try_get("file_path")?,
        preview_path: row.try_get("preview_path")?,
        metadata: metadata
            .and_then(|m| serde_json::from_str(&m).ok())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
        created_at: timestamp::decode_required(row, "created_at")?,
        updated_at: timestamp::decode_required(row, "updated_at")?,
    })
}
