//! Configuration management for mediagen
//!
//! Supports dual-location configuration:
//! - User-level: ~/.mediagen/mediagen.toml
//! - Project-level: ./.mediagen/mediagen.toml
//!
//! Project-level config overrides user-level config. `--config <path>`
//! replaces both.

mod loader;
mod schema;
mod validation;

pub use loader::ConfigLoader;
pub use schema::{
    expand_env_vars, DatabaseConfig, EligibilityConfig, EngineConfig, ImageWorkflowConfig,
    LogFormat, LoggingConfig, MediaConfig, ServiceConfig, SongWorkflowConfig, WorkflowsConfig,
};
pub use validation::{find_executable, ValidationReport, LONG_TIMEOUT_SECS};

use crate::Result;
use std::path::PathBuf;

/// Load configuration from `explicit`, or from the user and project locations
pub async fn load_config(explicit: Option<PathBuf>) -> Result<MediaConfig> {
    let loader = match explicit {
        Some(path) => ConfigLoader::new().with_explicit_path(path),
        None => ConfigLoader::new(),
    };
    loader.load().await
}
