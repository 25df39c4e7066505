//! Database and configuration maintenance handlers

use crate::cli::{open_database, prompt_repository};
use crate::config::{ConfigLoader, MediaConfig};
use crate::db::{CheckpointMode, CheckpointOutcome, Database};
use crate::error::{MediaError, Result};
use crate::models::PromptType;
use colored::Colorize;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Handle validate command. Prints every finding, fails if any is an error.
pub fn handle_validate(config: &MediaConfig, loader: &ConfigLoader) -> Result<()> {
    let sources = loader.sources();
    if sources.is_empty() {
        println!("Configuration: {}", "built-in defaults".dimmed());
    } else {
        for source in sources {
            println!("Configuration: {}", source.display());
        }
    }

    let report = config.validate();
    for warning in &report.warnings {
        println!("{} {}", "⚠".yellow(), warning);
    }
    for error in &report.errors {
        println!("{} {}", "✗".red(), error);
    }

    if report.is_ok() {
        println!("{}", "✓ Configuration is valid".green().bold());
        Ok(())
    } else {
        Err(MediaError::InvalidConfig(report.errors))
    }
}

/// Handle migrate command. Creates the database file if needed.
pub async fn handle_migrate(config: &MediaConfig) -> Result<()> {
    config.validate_database(false).into_result()?;
    let db = Database::from_config(&config.database).await?;
    db.run_migrations().await?;
    db.close().await;
    println!(
        "{} {}",
        "✓ Schema up to date:".green().bold(),
        config.database.path.display()
    );
    Ok(())
}

/// Handle reclaim command
pub async fn handle_reclaim(config: &MediaConfig, older_than_secs: Option<u64>) -> Result<()> {
    let db = open_database(config).await?;
    let repo = prompt_repository(db, config);
    let secs = older_than_secs.unwrap_or(config.service.stale_after_secs);

    let reclaimed = repo.reclaim_stale(Duration::from_secs(secs)).await?;
    if reclaimed == 0 {
        println!("{}", "No stale prompts".yellow());
    } else {
        println!(
            "{} {} prompt(s) processing for more than {}s",
            "✓ Reclaimed".green().bold(),
            reclaimed,
            secs
        );
    }
    Ok(())
}

/// Handle checkpoint command
pub async fn handle_checkpoint(config: &MediaConfig, mode: CheckpointMode) -> Result<()> {
    let db = open_database(config).await?;
    match db.transactions().checkpoint(mode).await {
        CheckpointOutcome::Complete {
            checkpointed_frames,
            ..
        } => {
            println!(
                "{} ({}): {} frame(s) copied",
                "✓ Checkpoint complete".green().bold(),
                mode,
                checkpointed_frames.max(0)
            );
        }
        CheckpointOutcome::Partial {
            log_frames,
            checkpointed_frames,
        } => {
            println!(
                "{} ({}): {}/{} frame(s) copied, readers still hold the rest",
                "⚠ Checkpoint partial".yellow().bold(),
                mode,
                checkpointed_frames,
                log_frames
            );
        }
        CheckpointOutcome::Failed(reason) => {
            println!("{} ({}): {}", "✗ Checkpoint failed".red().bold(), mode, reason);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Type")]
    prompt_type: &'static str,
    #[tabled(rename = "Pending")]
    pending: i64,
}

/// Handle stats command: queue depth and WAL state
pub async fn handle_stats(config: &MediaConfig, json: bool) -> Result<()> {
    let db = open_database(config).await?;
    let counts = prompt_repository(db.clone(), config).pending_counts().await?;
    let wal = db.transactions().wal_stats().await?;

    if json {
        let value = serde_json::json!({
            "pending": {
                "image": counts.image,
                "lyrics": counts.lyrics,
                "total": counts.total(),
            },
            "wal": wal,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let rows: Vec<CountRow> = PromptType::all()
        .iter()
        .map(|ty| CountRow {
            prompt_type: ty.short_name(),
            pending: counts.for_type(*ty),
        })
        .collect();
    println!("{}", Table::new(rows));
    println!();
    println!("{}", "Database".bold());
    println!("  Journal mode: {}", wal.journal_mode);
    println!("  Size:         {} bytes", wal.db_size_bytes);
    println!("  WAL size:     {} bytes", wal.wal_size_bytes);
    println!("  WAL frames:   {}", wal.wal_frames);
    println!("  WAL ratio:    {:.2}", wal.wal_ratio);
    if wal.wal_busy {
        println!("  {}", "WAL has frames pinned by readers".yellow());
    }
    Ok(())
}
