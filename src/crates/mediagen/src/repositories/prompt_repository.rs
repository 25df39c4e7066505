//! Prompt repository for eligibility reads and generation state transitions
//!
//! Every state change runs in an `IMMEDIATE` transaction on its own
//! connection and is followed by a passive WAL checkpoint so that other
//! processes sharing the database see it promptly.

use crate::db::{CheckpointMode, Database, IsolationLevel};
use crate::error::{truncate_message, MediaError, Result, MAX_ERROR_MESSAGE_CHARS};
use crate::models::{ArtifactStatus, ContentItem, EligibilityPolicy, PromptRecord, PromptType};
use crate::repositories::timestamp;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROMPT_COLUMNS: &str = "p.id, p.prompt_text, p.prompt_type, p.status, p.artifact_status,
     p.created_at, p.completed_at, p.processing_started_at, p.error_message";

const HAS_MATCHING_CONTENT: &str = "EXISTS (
         SELECT 1 FROM prompt_writings pw
         JOIN writings w ON w.id = pw.writing_id
         WHERE pw.prompt_id = p.id AND w.content_type = p.prompt_type
     )";

/// Pending prompt counts per type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub image: i64,
    pub lyrics: i64,
}

impl PendingCounts {
    pub fn total(&self) -> i64 {
        self.image + self.lyrics
    }

    pub fn for_type(&self, prompt_type: PromptType) -> i64 {
        match prompt_type {
            PromptType::Image => self.image,
            PromptType::Lyrics => self.lyrics,
        }
    }
}

/// Repository for prompt database operations
#[derive(Clone, Debug)]
pub struct PromptRepository {
    db: Arc<Database>,
    policy: EligibilityPolicy,
}

impl PromptRepository {
    /// Create a new prompt repository with the default eligibility policy
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            policy: EligibilityPolicy::default(),
        }
    }

    /// Builder: set the eligibility policy
    pub fn with_policy(mut self, policy: EligibilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &EligibilityPolicy {
        &self.policy
    }

    /// Pending prompts of `prompt_type` with at least one matching content
    /// record, oldest first. Does not change any state.
    pub async fn find_eligible(&self, prompt_type: PromptType, limit: u32) -> Result<Vec<PromptRecord>> {
        let required_status = self.policy.required_upstream_status.clone();
        let created = timestamp::order_key("p.created_at");
        let sql = format!(
            "SELECT {PROMPT_COLUMNS}
             FROM prompts p
             WHERE p.artifact_status = 'pending'
               AND p.prompt_type = ?
               AND (? IS NULL OR p.status = ?)
               AND {HAS_MATCHING_CONTENT}
             ORDER BY {created} ASC, p.id ASC
             LIMIT ?"
        );

        let prompts = self
            .db
            .transactions()
            .run(IsolationLevel::Deferred, move |conn| {
                Box::pin(async move {
                    let rows = sqlx::query(&sql)
                        .bind(prompt_type.as_str())
                        .bind(required_status.as_deref())
                        .bind(required_status.as_deref())
                        .bind(i64::from(limit))
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| {
                            MediaError::Database(format!("Failed to query eligible prompts: {}", e))
                        })?;

                    let mut prompts = Vec::with_capacity(rows.len());
                    for row in rows {
                        let id: i64 = row.try_get("id")?;
                        let contents = load_contents(&mut *conn, id, prompt_type).await?;
                        if let Some(prompt) = decode_or_skip(&row, id, contents) {
                            prompts.push(prompt);
                        }
                    }
                    Ok(prompts)
                })
            })
            .await?;

        debug!(
            prompt_type = %prompt_type,
            count = prompts.len(),
            "Loaded eligible prompts"
        );
        Ok(prompts)
    }

    /// Load one prompt with its matching content records, whatever its status
    pub async fn find_by_id(&self, prompt_id: i64) -> Result<PromptRecord> {
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts p WHERE p.id = ?");

        self.db
            .transactions()
            .run(IsolationLevel::Deferred, move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(&sql)
                        .bind(prompt_id)
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(|e| MediaError::Database(format!("Failed to load prompt: {}", e)))?
                        .ok_or_else(|| MediaError::not_found(format!("prompt {}", prompt_id)))?;

                    let prompt_type = parse_prompt_type(&row)?;
                    let contents = load_contents(&mut *conn, prompt_id, prompt_type).await?;
                    prompt_from_row(&row, contents)
                })
            })
            .await
    }

    /// List prompts in a given generation state, oldest first
    pub async fn list_by_status(
        &self,
        status: ArtifactStatus,
        prompt_type: Option<PromptType>,
        limit: u32,
    ) -> Result<Vec<PromptRecord>> {
        let created = timestamp::order_key("p.created_at");
        let sql = format!(
            "SELECT {PROMPT_COLUMNS}
             FROM prompts p
             WHERE p.artifact_status = ?
               AND (? IS NULL OR p.prompt_type = ?)
             ORDER BY {created} ASC, p.id ASC
             LIMIT ?"
        );
        let type_filter = prompt_type.map(|t| t.as_str());

        self.db
            .transactions()
            .run(IsolationLevel::Deferred, move |conn| {
                Box::pin(async move {
                    let rows = sqlx::query(&sql)
                        .bind(status.as_str())
                        .bind(type_filter)
                        .bind(type_filter)
                        .bind(i64::from(limit))
                        .fetch_all(&mut *conn)
                        .await
                        .map_err(|e| MediaError::Database(format!("Failed to list prompts: {}", e)))?;

                    let mut prompts = Vec::with_capacity(rows.len());
                    for row in rows {
                        // Producer rows of other kinds share the table
                        let Ok(prompt_type) = parse_prompt_type(&row) else {
                            continue;
                        };
                        let id: i64 = row.try_get("id")?;
                        let contents = load_contents(&mut *conn, id, prompt_type).await?;
                        if let Some(prompt) = decode_or_skip(&row, id, contents) {
                            prompts.push(prompt);
                        }
                    }
                    Ok(prompts)
                })
            })
            .await
    }

    /// Claim a pending prompt for generation.
    ///
    /// Returns `false` when the prompt is no longer pending, which means
    /// another worker got there first.
    pub async fn claim(&self, prompt_id: i64) -> Result<bool> {
        let now = Utc::now().timestamp();

        let affected = self
            .db
            .transactions()
            .immediate(move |conn| {
                Box::pin(async move {
                    let done = sqlx::query(
                        "UPDATE prompts
                         SET artifact_status = 'processing', processing_started_at = ?, error_message = NULL
                         WHERE id = ? AND artifact_status = 'pending'",
                    )
                    .bind(now)
                    .bind(prompt_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| MediaError::Database(format!("Failed to claim prompt: {}", e)))?;
                    Ok(done.rows_affected())
                })
            })
            .await?;

        let claimed = affected == 1;
        if claimed {
            info!(prompt_id, from = "pending", to = "processing", "Prompt claimed");
            self.db.transactions().checkpoint(CheckpointMode::Passive).await;
        } else {
            debug!(prompt_id, "Prompt already claimed or no longer pending");
        }
        Ok(claimed)
    }

    /// Move a prompt to `status`.
    ///
    /// `Error` stores `error_message` truncated to 500 characters; any other
    /// status clears it.
    pub async fn set_artifact_status(
        &self,
        prompt_id: i64,
        status: ArtifactStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let message = error_message.map(str::to_string);

        let previous = self
            .db
            .transactions()
            .immediate(move |conn| {
                Box::pin(async move {
                    let previous: Option<String> =
                        sqlx::query_scalar("SELECT artifact_status FROM prompts WHERE id = ?")
                            .bind(prompt_id)
                            .fetch_optional(&mut *conn)
                            .await?;
                    let previous =
                        previous.ok_or_else(|| MediaError::not_found(format!("prompt {}", prompt_id)))?;

                    update_status_on(&mut *conn, prompt_id, status, message.as_deref()).await?;
                    Ok(previous)
                })
            })
            .await?;

        match status {
            ArtifactStatus::Error => warn!(
                prompt_id,
                from = %previous,
                to = %status,
                "Prompt marked as failed"
            ),
            _ => info!(prompt_id, from = %previous, to = %status, "Prompt status updated"),
        }

        self.db.transactions().checkpoint(CheckpointMode::Passive).await;
        Ok(())
    }

    /// Return prompts stuck in `processing` for longer than `timeout` to
    /// `pending`. A missing claim timestamp counts as stale.
    pub async fn reclaim_stale(&self, timeout: Duration) -> Result<u64> {
        let timeout_secs = timeout.as_secs();
        let cutoff = Utc::now()
            .timestamp()
            .saturating_sub(i64::try_from(timeout_secs).unwrap_or(i64::MAX));
        let note = format!(
            "reclaimed after exceeding processing timeout of {}s",
            timeout_secs
        );

        let reclaimed = self
            .db
            .transactions()
            .immediate(move |conn| {
                Box::pin(async move {
                    let done = sqlx::query(
                        "UPDATE prompts
                         SET artifact_status = 'pending', processing_started_at = NULL, error_message = ?
                         WHERE artifact_status = 'processing'
                           AND (processing_started_at IS NULL OR processing_started_at < ?)",
                    )
                    .bind(note)
                    .bind(cutoff)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| MediaError::Database(format!("Failed to reclaim prompts: {}", e)))?;
                    Ok(done.rows_affected())
                })
            })
            .await?;

        if reclaimed > 0 {
            info!(
                count = reclaimed,
                timeout_secs,
                from = "processing",
                to = "pending",
                "Reclaimed stale prompts"
            );
            self.db.transactions().checkpoint(CheckpointMode::Passive).await;
        } else {
            debug!(timeout_secs, "No stale prompts to reclaim");
        }
        Ok(reclaimed)
    }

    /// Put an errored prompt back in the queue.
    ///
    /// Returns `false` if the prompt exists but is not in `error`.
    pub async fn reset_errored(&self, prompt_id: i64) -> Result<bool> {
        let reset = self
            .db
            .transactions()
            .immediate(move |conn| {
                Box::pin(async move {
                    let done = sqlx::query(
                        "UPDATE prompts
                         SET artifact_status = 'pending', processing_started_at = NULL, error_message = NULL
                         WHERE id = ? AND artifact_status = 'error'",
                    )
                    .bind(prompt_id)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| MediaError::Database(format!("Failed to reset prompt: {}", e)))?;

                    if done.rows_affected() == 1 {
                        return Ok(true);
                    }

                    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM prompts WHERE id = ?")
                        .bind(prompt_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                    match exists {
                        Some(_) => Ok(false),
                        None => Err(MediaError::not_found(format!("prompt {}", prompt_id))),
                    }
                })
            })
            .await?;

        if reset {
            info!(prompt_id, from = "error", to = "pending", "Prompt reset");
            self.db.transactions().checkpoint(CheckpointMode::Passive).await;
        }
        Ok(reset)
    }

    /// Count eligible prompts per type under the current policy
    pub async fn pending_counts(&self) -> Result<PendingCounts> {
        let sql = format!(
            "SELECT p.prompt_type AS prompt_type, COUNT(*) AS total
             FROM prompts p
             WHERE p.artifact_status = 'pending'
               AND (? IS NULL OR p.status = ?)
               AND {HAS_MATCHING_CONTENT}
             GROUP BY p.prompt_type"
        );
        let required_status = self.policy.required_upstream_status.as_deref();

        let rows = sqlx::query(&sql)
            .bind(required_status)
            .bind(required_status)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| MediaError::Database(format!("Failed to count pending prompts: {}", e)))?;

        let mut counts = PendingCounts::default();
        for row in rows {
            let prompt_type: String = row.try_get("prompt_type")?;
            let total: i64 = row.try_get("total")?;
            match PromptType::parse(&prompt_type) {
                Some(PromptType::Image) => counts.image += total,
                Some(PromptType::Lyrics) => counts.lyrics += total,
                None => {}
            }
        }
        Ok(counts)
    }
}

/// Write a status transition on an open transaction. Returns rows affected.
pub(crate) async fn update_status_on(
    conn: &mut SqliteConnection,
    prompt_id: i64,
    status: ArtifactStatus,
    error_message: Option<&str>,
) -> Result<u64> {
    let message = match status {
        ArtifactStatus::Error => Some(truncate_message(
            error_message.unwrap_or("unknown error"),
            MAX_ERROR_MESSAGE_CHARS,
        )),
        _ => None,
    };
    let started_at = match status {
        ArtifactStatus::Processing => Some(Utc::now().timestamp()),
        _ => None,
    };

    let done = sqlx::query(
        "UPDATE prompts
         SET artifact_status = ?, error_message = ?, processing_started_at = ?
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(message)
    .bind(started_at)
    .bind(prompt_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| MediaError::Database(format!("Failed to update prompt status: {}", e)))?;

    if done.rows_affected() == 0 {
        return Err(MediaError::not_found(format!("prompt {}", prompt_id)));
    }
    Ok(done.rows_affected())
}

async fn load_contents(
    conn: &mut SqliteConnection,
    prompt_id: i64,
    prompt_type: PromptType,
) -> Result<Vec<ContentItem>> {
    let rows = sqlx::query(
        "SELECT w.id, w.content, w.content_type, w.title, pw.position
         FROM prompt_writings pw
         JOIN writings w ON w.id = pw.writing_id
         WHERE pw.prompt_id = ? AND w.content_type = ?
         ORDER BY pw.position ASC, w.id ASC",
    )
    .bind(prompt_id)
    .bind(prompt_type.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MediaError::Database(format!("Failed to load prompt content: {}", e)))?;

    rows.iter()
        .map(|row| {
            Ok(ContentItem {
                id: row.try_get("id")?,
                content: row.try_get("content")?,
                content_type: row.try_get("content_type")?,
                title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
                position: row.try_get::<Option<i64>, _>("position")?.unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_prompt_type(row: &SqliteRow) -> Result<PromptType> {
    let raw: String = row.try_get("prompt_type")?;
    PromptType::parse(&raw)
        .ok_or_else(|| MediaError::Database(format!("Unknown prompt type '{}'", raw)))
}

/// Decode a listed row, logging and dropping it when a column is unreadable
fn decode_or_skip(row: &SqliteRow, prompt_id: i64, contents: Vec<ContentItem>) -> Option<PromptRecord> {
    match prompt_from_row(row, contents) {
        Ok(prompt) => Some(prompt),
        Err(e) => {
            warn!(prompt_id, error = %e, "Skipping prompt row that cannot be decoded");
            None
        }
    }
}

fn prompt_from_row(row: &SqliteRow, contents: Vec<ContentItem>) -> Result<PromptRecord> {
    let artifact_status: String = row.try_get("artifact_status")?;

    Ok(PromptRecord {
        id: row.try_get("id")?,
        prompt_text: row.try_get::<Option<String>, _>("prompt_text")?.unwrap_or_default(),
        prompt_type: parse_prompt_type(row)?,
        status: row.try_get::<Option<String>, _>("status")?.unwrap_or_default(),
        artifact_status: ArtifactStatus::from(artifact_status.as_str()),
        created_at: timestamp::decode_required(row, "created_at")?,
        completed_at: timestamp::decode_optional(row, "completed_at")?,
        processing_started_at: timestamp::decode_optional(row, "processing_started_at")?,
        error_message: row.try_get("error_message")?,
        contents,
    })
}
