//! Artifact listing handlers

use crate::cli::{artifact_repository, ellipsize, format_timestamp, open_database};
use crate::config::MediaConfig;
use crate::error::Result;
use crate::models::{ArtifactRecord, ArtifactType};
use colored::Colorize;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Prompt")]
    prompt_id: i64,
    #[tabled(rename = "Type")]
    artifact_type: String,
    #[tabled(rename = "File")]
    file_path: String,
    #[tabled(rename = "Preview")]
    preview: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&ArtifactRecord> for ArtifactRow {
    fn from(artifact: &ArtifactRecord) -> Self {
        Self {
            id: artifact.id,
            prompt_id: artifact.prompt_id,
            artifact_type: artifact.artifact_type.to_string(),
            file_path: ellipsize(&artifact.file_path, 60),
            preview: artifact
                .preview_path
                .as_deref()
                .map(|p| ellipsize(p, 40))
                .unwrap_or_else(|| "-".to_string()),
            created: format_timestamp(artifact.created_at),
        }
    }
}

fn print_artifacts(artifacts: &[ArtifactRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(artifacts)?);
        return Ok(());
    }
    if artifacts.is_empty() {
        println!("{}", "No artifacts found".yellow());
        return Ok(());
    }
    let rows: Vec<ArtifactRow> = artifacts.iter().map(ArtifactRow::from).collect();
    println!("{}", Table::new(rows));
    println!("\n{} {} artifact(s)", "Total:".bold(), artifacts.len());
    Ok(())
}

/// Handle artifacts command for one prompt, newest first
pub async fn handle_for_prompt(config: &MediaConfig, prompt_id: i64, json: bool) -> Result<()> {
    let db = open_database(config).await?;
    let artifacts = artifact_repository(db).get_for_prompt(prompt_id).await?;
    print_artifacts(&artifacts, json)
}

/// Handle artifacts command without a prompt: most recent of one type
pub async fn handle_recent(
    config: &MediaConfig,
    artifact_type: ArtifactType,
    limit: u32,
    json: bool,
) -> Result<()> {
    let db = open_database(config).await?;
    let artifacts = artifact_repository(db)
        .list_recent(artifact_type, limit)
        .await?;
    print_artifacts(&artifacts, json)
}
