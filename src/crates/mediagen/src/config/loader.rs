//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.mediagen/mediagen.toml
//! 3. Project-level config: ./.mediagen/mediagen.toml
//!
//! Later configs override earlier ones key by key. An explicit path given on
//! the command line replaces both files.

use crate::config::schema::MediaConfig;
use crate::error::{MediaError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const CONFIG_DIR: &str = ".mediagen";
const CONFIG_FILE: &str = "mediagen.toml";

/// Configuration loader that handles both user and project configs
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            user_config_path: Self::default_user_config_path(),
            project_config_path: PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
            explicit_path: None,
        }
    }

    /// Load only `path`, on top of the defaults
    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Override both search locations
    pub fn with_locations(mut self, user: Option<PathBuf>, project: PathBuf) -> Self {
        self.user_config_path = user;
        self.project_config_path = project;
        self
    }

    fn default_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load and merge configuration, then expand `${VAR}` references
    pub async fn load(&self) -> Result<MediaConfig> {
        let mut merged = toml::Table::new();

        if let Some(path) = &self.explicit_path {
            info!(path = %path.display(), "Loading configuration");
            merged = Self::read_table(path).await?;
        } else {
            info!("Loading configuration with defaults");

            if let Some(user) = &self.user_config_path {
                match Self::read_optional(user).await? {
                    Some(table) => {
                        debug!(path = %user.display(), "Loaded user-level config");
                        merge_tables(&mut merged, table);
                    }
                    None => debug!(path = %user.display(), "User-level config not found"),
                }
            }

            match Self::read_optional(&self.project_config_path).await? {
                Some(table) => {
                    debug!(path = %self.project_config_path.display(), "Loaded project-level config");
                    merge_tables(&mut merged, table);
                }
                None => debug!(
                    path = %self.project_config_path.display(),
                    "Project-level config not found"
                ),
            }
        }

        let mut config = toml::Value::Table(merged).try_into::<MediaConfig>()?;
        config.resolve_env_vars();

        info!("Configuration loaded successfully");
        Ok(config)
    }

    async fn read_optional(path: &Path) -> Result<Option<toml::Table>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::read_table(path).await.map(Some)
    }

    async fn read_table(path: &Path) -> Result<toml::Table> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            MediaError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            MediaError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Files that would be read, in override order
    pub fn sources(&self) -> Vec<PathBuf> {
        match &self.explicit_path {
            Some(path) => vec![path.clone()],
            None => self
                .user_config_path
                .iter()
                .chain(std::iter::once(&self.project_config_path))
                .filter(|p| p.exists())
                .cloned()
                .collect(),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay `overlay` onto `base`; nested tables merge, other values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let incoming = match value {
            toml::Value::Table(incoming) => incoming,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}
