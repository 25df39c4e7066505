//! Scoped transactions and WAL checkpoints
//!
//! Every transaction runs on its own short-lived connection so that writers
//! from separate processes (the interactive worker, the periodic service and
//! external readers) contend only through SQLite's own locking. Connections
//! are opened in WAL mode with a busy timeout, so a writer that meets a lock
//! waits instead of failing immediately.

use crate::error::{MediaError, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default busy timeout for transaction connections
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default busy timeout for checkpoint connections
pub const DEFAULT_CHECKPOINT_TIMEOUT: Duration = Duration::from_secs(5);

/// How eagerly a transaction takes SQLite's write lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Lock taken on first write. May fail with "database is locked" mid-way
    /// under contention, so only suitable for reads.
    Deferred,
    /// Write lock taken at BEGIN. Used for every repository write.
    #[default]
    Immediate,
    /// Blocks all other connections, readers included. Maintenance only.
    Exclusive,
}

impl IsolationLevel {
    fn begin_statement(&self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `PRAGMA wal_checkpoint` modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Checkpoint what it can without waiting on anyone
    Passive,
    /// Wait for writers, then checkpoint every frame
    Full,
    /// Full, then wait for readers so the log restarts from the beginning
    Restart,
    /// Restart, then truncate the log file to zero bytes
    Truncate,
}

impl CheckpointMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passive => "PASSIVE",
            Self::Full => "FULL",
            Self::Restart => "RESTART",
            Self::Truncate => "TRUNCATE",
        }
    }

    fn pragma(&self) -> &'static str {
        match self {
            Self::Passive => "PRAGMA wal_checkpoint(PASSIVE)",
            Self::Full => "PRAGMA wal_checkpoint(FULL)",
            Self::Restart => "PRAGMA wal_checkpoint(RESTART)",
            Self::Truncate => "PRAGMA wal_checkpoint(TRUNCATE)",
        }
    }
}

impl fmt::Display for CheckpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CheckpointMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PASSIVE" => Ok(Self::Passive),
            "FULL" => Ok(Self::Full),
            "RESTART" => Ok(Self::Restart),
            "TRUNCATE" => Ok(Self::Truncate),
            other => Err(MediaError::Other(format!(
                "Unknown checkpoint mode '{}'. Expected passive, full, restart or truncate",
                other
            ))),
        }
    }
}

/// Result of a checkpoint attempt. Never an error: a failed checkpoint only
/// delays cross-process visibility, the committed data is already durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Every frame in the log was copied into the database file
    Complete {
        log_frames: i64,
        checkpointed_frames: i64,
    },
    /// Readers or writers kept some frames in the log
    Partial {
        log_frames: i64,
        checkpointed_frames: i64,
    },
    /// The checkpoint could not run at all
    Failed(String),
}

impl CheckpointOutcome {
    fn from_pragma_row(busy: i64, log_frames: i64, checkpointed_frames: i64) -> Self {
        // log_frames is -1 when the database is not in WAL mode
        if busy != 0 || (log_frames >= 0 && checkpointed_frames < log_frames) {
            Self::Partial {
                log_frames,
                checkpointed_frames,
            }
        } else {
            Self::Complete {
                log_frames,
                checkpointed_frames,
            }
        }
    }

    /// True only when nothing was left behind in the log
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// WAL statistics for monitoring log growth and checkpoint health
#[derive(Debug, Clone, Serialize)]
pub struct WalStats {
    pub journal_mode: String,
    pub db_size_bytes: i64,
    pub wal_size_bytes: u64,
    pub wal_frames: i64,
    pub wal_busy: bool,
    pub wal_ratio: f64,
}

/// Build connection options shared by pooled and transaction connections
pub fn connect_options(path: &Path, busy_timeout: Duration) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(busy_timeout)
        .foreign_keys(true)
}

/// Runs transactions and checkpoints against one database file
#[derive(Debug, Clone)]
pub struct TransactionManager {
    path: PathBuf,
    busy_timeout: Duration,
    checkpoint_timeout: Duration,
}

impl TransactionManager {
    /// Create a transaction manager for the database at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            checkpoint_timeout: DEFAULT_CHECKPOINT_TIMEOUT,
        }
    }

    /// Builder: set how long a writer waits on a locked database
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Builder: set how long a checkpoint waits on a locked database
    pub fn with_checkpoint_timeout(mut self, timeout: Duration) -> Self {
        self.checkpoint_timeout = timeout;
        self
    }

    /// Path of the managed database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Busy timeout applied to transaction connections
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    async fn connect(&self, busy_timeout: Duration) -> Result<SqliteConnection> {
        let mut conn = connect_options(&self.path, busy_timeout)
            .connect()
            .await
            .map_err(|e| {
                MediaError::Database(format!(
                    "Failed to open {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        for pragma in ["PRAGMA cache_size = 10000", "PRAGMA temp_store = MEMORY"] {
            sqlx::query(pragma).execute(&mut conn).await?;
        }

        Ok(conn)
    }

    /// Run `body` inside a transaction at the given isolation level.
    ///
    /// Commits when `body` returns `Ok`, rolls back and returns the body's
    /// error otherwise. The connection is closed on every path.
    ///
    /// ```rust,no_run
    /// # use mediagen::db::{IsolationLevel, TransactionManager};
    /// # async fn example(tx: TransactionManager) -> mediagen::Result<()> {
    /// let changed = tx
    ///     .run(IsolationLevel::Immediate, |conn| {
    ///         Box::pin(async move {
    ///             let done = sqlx::query("UPDATE prompts SET status = 'completed'")
    ///                 .execute(&mut *conn)
    ///                 .await?;
    ///             Ok(done.rows_affected())
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<T, F>(&self, isolation: IsolationLevel, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut conn = self.connect(self.busy_timeout).await?;
        let outcome = Self::execute(&mut conn, isolation, body).await;

        if let Err(e) = conn.close().await {
            error!(error = %e, "Error closing transaction connection");
        } else {
            debug!("Transaction connection closed");
        }

        outcome
    }

    /// Shorthand for [`run`](Self::run) at `IMMEDIATE` isolation
    pub async fn immediate<T, F>(&self, body: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        self.run(IsolationLevel::Immediate, body).await
    }

    async fn execute<T, F>(
        conn: &mut SqliteConnection,
        isolation: IsolationLevel,
        body: F,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        sqlx::query(isolation.begin_statement())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                MediaError::Database(format!("Failed to begin {} transaction: {}", isolation, e))
            })?;
        debug!(isolation = %isolation, "Transaction started");

        match body(&mut *conn).await {
            Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
                Ok(_) => {
                    debug!(isolation = %isolation, "Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    error!(error = %e, "Commit failed");
                    Self::rollback(conn).await;
                    Err(MediaError::Database(format!("Failed to commit transaction: {}", e)))
                }
            },
            Err(err) => {
                error!(error = %err, isolation = %isolation, "Error in transaction");
                Self::rollback(conn).await;
                Err(err)
            }
        }
    }

    async fn rollback(conn: &mut SqliteConnection) {
        match sqlx::query("ROLLBACK").execute(&mut *conn).await {
            Ok(_) => info!("Transaction rolled back"),
            Err(e) => error!(error = %e, "Rollback failed"),
        }
    }

    /// Flush the write-ahead log into the main database file so that other
    /// processes observe committed data.
    pub async fn checkpoint(&self, mode: CheckpointMode) -> CheckpointOutcome {
        let outcome = match self.try_checkpoint(mode).await {
            Ok(outcome) => outcome,
            Err(e) => CheckpointOutcome::Failed(e.to_string()),
        };

        match &outcome {
            CheckpointOutcome::Complete {
                log_frames,
                checkpointed_frames,
            } => debug!(
                mode = %mode,
                log_frames,
                checkpointed_frames,
                "WAL checkpoint complete"
            ),
            CheckpointOutcome::Partial {
                log_frames,
                checkpointed_frames,
            } => warn!(
                mode = %mode,
                log_frames,
                checkpointed_frames,
                "WAL checkpoint partially blocked"
            ),
            CheckpointOutcome::Failed(reason) => {
                warn!(mode = %mode, error = %reason, "WAL checkpoint failed")
            }
        }

        outcome
    }

    async fn try_checkpoint(&self, mode: CheckpointMode) -> Result<CheckpointOutcome> {
        let mut conn = self.connect(self.checkpoint_timeout).await?;
        let row: Result<(i64, i64, i64)> = sqlx::query_as(mode.pragma())
            .fetch_one(&mut conn)
            .await
            .map_err(MediaError::from);
        let _ = conn.close().await;

        let (busy, log_frames, checkpointed_frames) = row?;
        Ok(CheckpointOutcome::from_pragma_row(
            busy,
            log_frames,
            checkpointed_frames,
        ))
    }

    /// Collect WAL statistics. Runs a passive checkpoint as a side effect.
    pub async fn wal_stats(&self) -> Result<WalStats> {
        let mut conn = self.connect(self.checkpoint_timeout).await?;
        let stats = Self::collect_stats(&mut conn, &self.path).await;
        let _ = conn.close().await;
        stats
    }

    async fn collect_stats(conn: &mut SqliteConnection, path: &Path) -> Result<WalStats> {
        let (busy, wal_frames, _): (i64, i64, i64) =
            sqlx::query_as(CheckpointMode::Passive.pragma())
                .fetch_one(&mut *conn)
                .await?;
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&mut *conn)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&mut *conn)
            .await?;
        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&mut *conn)
            .await?;

        let wal_size_bytes = match tokio::fs::metadata(wal_path(path)).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let db_size_bytes = page_count * page_size;
        let wal_ratio = if db_size_bytes > 0 {
            wal_size_bytes as f64 / db_size_bytes as f64
        } else {
            0.0
        };

        Ok(WalStats {
            journal_mode,
            db_size_bytes,
            wal_size_bytes,
            wal_frames,
            wal_busy: busy != 0,
            wal_ratio,
        })
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}

/// Run `body` in a transaction on a fresh connection to `db_path`.
///
/// Free-function form of [`TransactionManager::run`] for one-off callers.
pub async fn run_in_transaction<T, F>(
    db_path: impl Into<PathBuf>,
    isolation: IsolationLevel,
    busy_timeout: Duration,
    body: F,
) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
{
    TransactionManager::new(db_path)
        .with_busy_timeout(busy_timeout)
        .run(isolation, body)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, TransactionManager) {
        let dir = TempDir::new().unwrap();
        let tx = TransactionManager::new(dir.path().join("tx.db"))
            .with_busy_timeout(Duration::from_secs(5));

        tx.immediate(|conn| {
            Box::pin(async move {
                sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        (dir, tx)
    }

    async fn count_items(tx: &TransactionManager) -> i64 {
        tx.run(IsolationLevel::Deferred, |conn| {
            Box::pin(async move {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
                    .fetch_one(&mut *conn)
                    .await?;
                Ok(count)
            })
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_commit_on_success() {
        let (_dir, tx) = setup().await;

        let inserted = tx
            .immediate(|conn| {
                Box::pin(async move {
                    for name in ["a", "b"] {
                        sqlx::query("INSERT INTO items (name) VALUES (?)")
                            .bind(name)
                            .execute(&mut *conn)
                            .await?;
                    }
                    Ok(2)
                })
            })
            .await
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(count_items(&tx).await, 2);
    }

    #[tokio::test]
    async fn test_rollback_on_error_keeps_original_error() {
        let (_dir, tx) = setup().await;

        let result: Result<()> = tx
            .immediate(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO items (name) VALUES ('kept?')")
                        .execute(&mut *conn)
                        .await?;
                    Err(MediaError::generation("body failed"))
                })
            })
            .await;

        match result {
            Err(MediaError::Generation(msg)) => assert_eq!(msg, "body failed"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(count_items(&tx).await, 0);
    }

    #[tokio::test]
    async fn test_rollback_on_sql_error() {
        let (_dir, tx) = setup().await;

        let result: Result<()> = tx
            .immediate(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO items (name) VALUES ('first')")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("INSERT INTO items (name) VALUES (NULL)")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .await;

        assert!(matches!(result, Err(MediaError::Sqlx(_))));
        assert_eq!(count_items(&tx).await, 0);
    }

    #[tokio::test]
    async fn test_exclusive_transaction() {
        let (_dir, tx) = setup().await;

        tx.run(IsolationLevel::Exclusive, |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO items (name) VALUES ('maintenance')")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        assert_eq!(count_items(&tx).await, 1);
    }

    #[tokio::test]
    async fn test_free_function_runs_transaction() {
        let (dir, tx) = setup().await;

        run_in_transaction(
            dir.path().join("tx.db"),
            IsolationLevel::Immediate,
            Duration::from_secs(1),
            |conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO items (name) VALUES ('free')")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            },
        )
        .await
        .unwrap();

        assert_eq!(count_items(&tx).await, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_complete_without_readers() {
        let (_dir, tx) = setup().await;

        let outcome = tx.checkpoint(CheckpointMode::Truncate).await;
        assert!(outcome.is_complete(), "got {:?}", outcome);
    }

    #[tokio::test]
    async fn test_checkpoint_failure_is_reported_not_raised() {
        let tx = TransactionManager::new("/nonexistent/dir/for/mediagen/tx.db");

        let outcome = tx.checkpoint(CheckpointMode::Passive).await;
        assert!(matches!(outcome, CheckpointOutcome::Failed(_)));
    }

    #[test]
    fn test_outcome_from_pragma_row() {
        assert!(CheckpointOutcome::from_pragma_row(0, 10, 10).is_complete());
        assert!(CheckpointOutcome::from_pragma_row(0, -1, -1).is_complete());
        assert!(!CheckpointOutcome::from_pragma_row(1, 10, 10).is_complete());
        assert!(!CheckpointOutcome::from_pragma_row(0, 10, 4).is_complete());
    }

    #[test]
    fn test_checkpoint_mode_parse() {
        assert_eq!("restart".parse::<CheckpointMode>().unwrap(), CheckpointMode::Restart);
        assert_eq!("TRUNCATE".parse::<CheckpointMode>().unwrap(), CheckpointMode::Truncate);
        assert!("sometimes".parse::<CheckpointMode>().is_err());
    }

    #[test]
    fn test_isolation_default_is_immediate() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::Immediate);
        assert_eq!(IsolationLevel::Deferred.begin_statement(), "BEGIN DEFERRED");
    }

    #[tokio::test]
    async fn test_wal_stats_reports_wal_mode() {
        let (_dir, tx) = setup().await;

        let stats = tx.wal_stats().await.unwrap();
        assert_eq!(stats.journal_mode.to_lowercase(), "wal");
        assert!(stats.db_size_bytes > 0);
    }
}
