//! Database management and migrations
//!
//! Provides the pooled SQLite connection used for plain reads, the embedded
//! schema migration, and the [`TransactionManager`] that every state change
//! goes through.

pub mod transaction;

pub use transaction::{
    run_in_transaction, CheckpointMode, CheckpointOutcome, IsolationLevel, TransactionManager,
    WalStats,
};

use crate::config::DatabaseConfig;
use crate::error::{MediaError, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Columns this crate needs on a `prompts` table the producer created first
const REQUIRED_PROMPT_COLUMNS: &[(&str, &str)] = &[
    ("prompt_text", "TEXT NOT NULL DEFAULT ''"),
    ("processing_started_at", "INTEGER"),
];

/// Database connection wrapper
#[derive(Clone, Debug)]
pub struct Database {
    pub(crate) pool: Arc<DatabasePool>,
    transactions: TransactionManager,
    path: PathBuf,
}

impl Database {
    /// Create a new database connection with default timeouts
    ///
    /// # Arguments
    /// * `database_path` - Path to the SQLite database file
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::with_timeouts(
            database_path,
            transaction::DEFAULT_BUSY_TIMEOUT,
            transaction::DEFAULT_CHECKPOINT_TIMEOUT,
        )
        .await
    }

    /// Create a new database connection from the `[database]` config section
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_timeouts(
            &config.path,
            Duration::from_secs(config.busy_timeout_secs),
            Duration::from_secs(config.checkpoint_timeout_secs),
        )
        .await
    }

    /// Create a new database connection with explicit lock timeouts
    ///
    /// # Arguments
    /// * `database_path` - Path to the SQLite database file
    /// * `busy_timeout` - How long writers wait on a locked database
    /// * `checkpoint_timeout` - How long checkpoints wait on a locked database
    pub async fn with_timeouts<P: AsRef<Path>>(
        database_path: P,
        busy_timeout: Duration,
        checkpoint_timeout: Duration,
    ) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MediaError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        debug!(path = %path.display(), "Connecting to database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(transaction::connect_options(path, busy_timeout))
            .await
            .map_err(|e| MediaError::Database(format!("Failed to connect to database: {}", e)))?;

        info!(path = %path.display(), "Database connection established");

        let transactions = TransactionManager::new(path)
            .with_busy_timeout(busy_timeout)
            .with_checkpoint_timeout(checkpoint_timeout);

        Ok(Self {
            pool: Arc::new(pool),
            transactions,
            path: path.to_path_buf(),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Transaction manager bound to this database file
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run migrations on the database
    ///
    /// Migrations are embedded in the binary and located in ./migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await?;
        self.ensure_prompt_columns().await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Add any column of [`REQUIRED_PROMPT_COLUMNS`] an existing `prompts`
    /// table lacks. Returns the names of the columns added.
    pub async fn ensure_prompt_columns(&self) -> Result<Vec<String>> {
        let added = self
            .transactions
            .immediate(|conn| {
                Box::pin(async move {
                    let existing: Vec<String> =
                        sqlx::query_scalar("SELECT name FROM pragma_table_info('prompts')")
                            .fetch_all(&mut *conn)
                            .await
                            .map_err(|e| {
                                MediaError::Database(format!("Failed to inspect prompts table: {}", e))
                            })?;

                    let mut added = Vec::new();
                    for (column, definition) in REQUIRED_PROMPT_COLUMNS {
                        if existing.iter().any(|name| name.eq_ignore_ascii_case(column)) {
                            continue;
                        }
                        sqlx::query(&format!("ALTER TABLE prompts ADD COLUMN {} {}", column, definition))
                            .execute(&mut *conn)
                            .await
                            .map_err(|e| {
                                MediaError::Database(format!("Failed to add prompts.{}: {}", column, e))
                            })?;
                        added.push(column.to_string());
                    }
                    Ok(added)
                })
            })
            .await?;

        for column in &added {
            warn!(column = %column, "Added missing column to prompts table");
        }
        Ok(added)
    }

    /// Perform a health check by running a simple query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| MediaError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }

    /// Open the database and run all migrations
    pub async fn initialize<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let db = Self::new(database_path).await?;
        db.run_migrations().await?;
        Ok(db)
    }
}
