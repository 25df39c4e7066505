//! Error types for mediagen
//!
//! Provides a unified error type for configuration, database, payload and
//! generation failures.

use thiserror::Error;

/// Result type alias for mediagen operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Maximum number of characters persisted in `prompts.error_message`
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Main error type for mediagen operations
#[derive(Debug, Error)]
pub enum MediaError {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was read but failed validation
    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// Database error with context
    #[error("Database error: {0}")]
    Database(String),

    /// Raw SQL error
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Prompt content could not be parsed into a payload
    #[error("Payload error: {0}")]
    Payload(String),

    /// External generation failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// External generation exceeded its time budget
    #[error("Generation for prompt {prompt_id} timed out after {duration_secs} seconds")]
    Timeout { prompt_id: i64, duration_secs: u64 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl MediaError {
    /// Create a new NotFound error with context
    pub fn not_found(context: impl Into<String>) -> Self {
        MediaError::NotFound(context.into())
    }

    /// Create a new Generation error
    pub fn generation(msg: impl Into<String>) -> Self {
        MediaError::Generation(msg.into())
    }

    /// Create a new Payload error
    pub fn payload(msg: impl Into<String>) -> Self {
        MediaError::Payload(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, MediaError::NotFound(_))
    }

    /// Whether SQLite reported lock contention that outlived the busy timeout
    pub fn is_busy(&self) -> bool {
        match self {
            MediaError::Sqlx(sqlx::Error::Database(db_err)) => {
                let msg = db_err.message();
                msg.contains("database is locked") || msg.contains("database is busy")
            }
            _ => false,
        }
    }
}

impl From<toml::de::Error> for MediaError {
    fn from(err: toml::de::Error) -> Self {
        MediaError::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<String> for MediaError {
    fn from(msg: String) -> Self {
        MediaError::Other(msg)
    }
}

impl From<&str> for MediaError {
    fn from(msg: &str) -> Self {
        MediaError::Other(msg.to_string())
    }
}

/// Truncate an error message to at most `max_chars` characters.
///
/// Cuts on a character boundary and marks the cut with a trailing ellipsis
/// that is counted against the limit.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let mut truncated: String = message.chars().take(max_chars - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_not_found_error() {
        let err = MediaError::not_found("prompt 42");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("prompt 42"));
    }

    #[test]
    fn test_invalid_config_lists_every_issue() {
        let err = MediaError::InvalidConfig(vec![
            "Database path not specified".to_string(),
            "Output directory not specified".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("Database path not specified"));
        assert!(msg.contains("Output directory not specified"));
    }

    #[test]
    fn test_timeout_display() {
        let err = MediaError::Timeout {
            prompt_id: 7,
            duration_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "Generation for prompt 7 timed out after 30 seconds"
        );
    }

    #[test]
    fn test_truncate_short_message_untouched() {
        assert_eq!(truncate_message("boom", 500), "boom");
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(600);
        let truncated = truncate_message(&long, MAX_ERROR_MESSAGE_CHARS);
        assert_eq!(truncated.chars().count(), MAX_ERROR_MESSAGE_CHARS);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let msg = "é".repeat(10);
        let truncated = truncate_message(&msg, 5);
        assert_eq!(truncated, "éééé…");
    }

    proptest! {
        #[test]
        fn prop_truncate_never_exceeds_limit(msg in ".*", limit in 0usize..64) {
            let truncated = truncate_message(&msg, limit);
            prop_assert!(truncated.chars().count() <= limit);
            if msg.chars().count() <= limit {
                prop_assert_eq!(truncated, msg);
            }
        }
    }
}
