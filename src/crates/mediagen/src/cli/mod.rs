//! CLI command implementations
//!
//! Provides command handlers for the mediagen CLI binary.

pub mod artifact;
pub mod generate;
pub mod maintenance;
pub mod prompt;

use crate::config::MediaConfig;
use crate::db::Database;
use crate::error::Result;
use crate::executor::{GenerationOrchestrator, WorkflowScriptBackend};
use crate::models::EligibilityPolicy;
use crate::repositories::{ArtifactRepository, PromptRepository};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::info;

/// Open the configured database after checking the `[database]` section and
/// bring the shared schema up to date
pub async fn open_database(config: &MediaConfig) -> Result<Arc<Database>> {
    config.validate_database(true).into_result()?;
    info!(path = %config.database.path.display(), "Opening database");
    let db = Database::from_config(&config.database).await?;
    db.run_migrations().await?;
    Ok(Arc::new(db))
}

/// Prompt repository honouring the configured eligibility policy
pub fn prompt_repository(db: Arc<Database>, config: &MediaConfig) -> PromptRepository {
    PromptRepository::new(db).with_policy(EligibilityPolicy {
        required_upstream_status: config.eligibility.required_upstream_status.clone(),
    })
}

pub fn artifact_repository(db: Arc<Database>) -> ArtifactRepository {
    ArtifactRepository::new(db)
}

/// Validate the full configuration and wire an orchestrator with the script backend
pub async fn build_orchestrator(config: &MediaConfig) -> Result<GenerationOrchestrator> {
    config.validate().into_result()?;
    let db = Database::from_config(&config.database).await?;
    db.run_migrations().await?;
    let db = Arc::new(db);
    let backend = Arc::new(WorkflowScriptBackend::from_config(config));
    Ok(GenerationOrchestrator::from_config(db, config, backend))
}

/// Local date-time for a Unix timestamp
pub(crate) fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Shorten to `max` characters for table cells
pub(crate) fn ellipsize(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        single_line
    } else {
        let kept: String = single_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("line one\nline two", 40), "line one line two");
        assert_eq!(ellipsize("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_format_timestamp_handles_out_of_range() {
        assert_eq!(format_timestamp(i64::MAX), "Unknown");
        assert_ne!(format_timestamp(0), "Unknown");
    }
}
