//! Prompt browsing command handlers

use crate::cli::{
    artifact_repository, ellipsize, format_timestamp, open_database, prompt_repository,
};
use crate::config::MediaConfig;
use crate::error::{MediaError, Result};
use crate::models::{ArtifactStatus, PromptPayload, PromptRecord, PromptType};
use colored::Colorize;
use tabled::{Table, Tabled};

/// Prompt display row for table output
#[derive(Tabled)]
struct PromptRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Type")]
    prompt_type: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&PromptRecord> for PromptRow {
    fn from(prompt: &PromptRecord) -> Self {
        Self {
            id: prompt.id,
            prompt_type: prompt.prompt_type.short_name().to_string(),
            status: prompt.artifact_status.to_string(),
            title: ellipsize(&prompt.display_title(), 48),
            created: format_timestamp(prompt.created_at),
        }
    }
}

fn colored_status(status: ArtifactStatus) -> String {
    match status {
        ArtifactStatus::Pending => status.as_str().yellow().to_string(),
        ArtifactStatus::Processing => status.as_str().cyan().to_string(),
        ArtifactStatus::Ready => status.as_str().green().to_string(),
        ArtifactStatus::Error => status.as_str().red().to_string(),
    }
}

/// Handle list command: eligible prompts by default, or prompts in `status`
pub async fn handle_list(
    config: &MediaConfig,
    prompt_type: Option<PromptType>,
    status: Option<ArtifactStatus>,
    limit: u32,
) -> Result<()> {
    let db = open_database(config).await?;
    let repo = prompt_repository(db, config);

    let prompts = match status {
        Some(status) => repo.list_by_status(status, prompt_type, limit).await?,
        None => {
            let types = match prompt_type {
                Some(ty) => vec![ty],
                None => PromptType::all().to_vec(),
            };
            let mut prompts = Vec::new();
            for ty in types {
                prompts.extend(repo.find_eligible(ty, limit).await?);
            }
            prompts.sort_by_key(|p| (p.created_at, p.id));
            prompts.truncate(limit as usize);
            prompts
        }
    };

    let counts = repo.pending_counts().await?;
    println!(
        "{} {} image, {} lyrics pending",
        "Queue:".bold(),
        counts.image,
        counts.lyrics
    );

    if prompts.is_empty() {
        println!("{}", "No prompts found".yellow());
        return Ok(());
    }

    let rows: Vec<PromptRow> = prompts.iter().map(PromptRow::from).collect();
    let count = rows.len();
    println!("{}", Table::new(rows));
    println!("\n{} {} prompt(s)", "Total:".bold(), count);

    Ok(())
}

/// Handle show command
pub async fn handle_show(config: &MediaConfig, id: i64) -> Result<()> {
    let db = open_database(config).await?;
    let repo = prompt_repository(db.clone(), config);
    let prompt = repo.find_by_id(id).await?;
    let artifacts = artifact_repository(db).get_for_prompt(id).await?;

    println!("{}", format!("Prompt #{}", prompt.id).bold());
    println!("  Type:       {}", prompt.prompt_type.short_name());
    println!("  Status:     {}", colored_status(prompt.artifact_status));
    println!("  Upstream:   {}", prompt.status);
    println!("  Created:    {}", format_timestamp(prompt.created_at));
    if let Some(started) = prompt.processing_started_at {
        println!("  Claimed:    {}", format_timestamp(started));
    }
    if let Some(error) = &prompt.error_message {
        println!("  Error:      {}", error.red());
    }
    if !prompt.prompt_text.is_empty() {
        println!("  Request:    {}", ellipsize(&prompt.prompt_text, 100));
    }
    println!("  Content:    {} record(s)", prompt.contents.len());
    println!("  Artifacts:  {}", artifacts.len());

    println!();
    println!("{}", "Content JSON:".bold());
    let json = serde_json::to_string_pretty(&prompt.content_json())?;
    println!("{}", json);

    if let PromptPayload::Lyrics(lyrics) = prompt.display_payload() {
        let tags = lyrics.tags();
        if !tags.is_empty() {
            println!();
            println!("{}", "Tags:".bold());
            println!("{}", tags);
        }
        if !lyrics.structure.is_empty() {
            println!();
            println!("{}", "Lyrics:".bold());
            print!("{}", lyrics.full_lyrics());
        }
    }

    Ok(())
}

/// Handle reset command: put errored prompts back in the queue
pub async fn handle_reset(config: &MediaConfig, ids: Vec<i64>) -> Result<()> {
    if ids.is_empty() {
        return Err(MediaError::Other("No prompt ids given".to_string()));
    }
    let db = open_database(config).await?;
    let repo = prompt_repository(db, config);

    for id in ids {
        match repo.reset_errored(id).await {
            Ok(true) => println!("{} Prompt #{} reset to pending", "✓".green(), id),
            Ok(false) => println!("{} Prompt #{} is not in error, left unchanged", "-".yellow(), id),
            Err(e) if e.is_not_found() => println!("{} Prompt #{} not found", "✗".red(), id),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
