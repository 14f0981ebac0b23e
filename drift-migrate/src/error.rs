//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::destructive::DestructiveChange;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// File system error with the path it occurred on.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path the operation failed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Schema-level error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid migration file or file name.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// A migration script could not be parsed.
    #[error("Script parse error at byte {offset}: {message}")]
    ParseScript {
        /// Byte offset of the offending construct.
        offset: usize,
        /// What went wrong.
        message: String,
    },

    /// The migration history cannot be reconstructed.
    #[error("Corrupted migration history at {}: {reason}", path.display())]
    CheckpointCorruption {
        /// File that broke the replay.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Destructive changes require an explicit override.
    #[error("{} destructive change(s) require an explicit override", .0.len())]
    DestructiveChanges(Vec<DestructiveChange>),

    /// Replaying an operation against a schema failed.
    #[error("Replay error: {0}")]
    Replay(String),

    /// JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrateError {
    /// Create an I/O error tagged with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a script parse error.
    pub fn script(offset: usize, msg: impl Into<String>) -> Self {
        Self::ParseScript {
            offset,
            message: msg.into(),
        }
    }

    /// Create a checkpoint corruption error.
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a replay error.
    pub fn replay(msg: impl Into<String>) -> Self {
        Self::Replay(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this is a recoverable error.
    ///
    /// A recoverable error means the caller can retry with different
    /// options; everything else signals a broken workspace or a bug.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DestructiveChanges(_))
    }
}

impl From<drift_schema::SchemaError> for MigrateError {
    fn from(err: drift_schema::SchemaError) -> Self {
        Self::Schema(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destructive::{ChangeCategory, DiffOrigin, Severity};

    #[test]
    fn test_io_error_carries_path() {
        let err = MigrateError::io(
            "migrations/20240101000000_init.js",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("20240101000000_init.js"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = MigrateError::script(42, "unknown call `db.dropEverything`");
        let msg = err.to_string();
        assert!(msg.contains("byte 42"));
        assert!(msg.contains("dropEverything"));
    }

    #[test]
    fn test_corruption_display() {
        let err = MigrateError::corruption("migrations/bad.js", "operation log undecodable");
        assert!(err.to_string().contains("bad.js"));
    }

    #[test]
    fn test_is_recoverable() {
        let destructive = MigrateError::DestructiveChanges(vec![DestructiveChange {
            severity: Severity::High,
            category: ChangeCategory::CollectionDeletion,
            description: "delete collection `posts`".to_string(),
            origin: DiffOrigin::CollectionDelete {
                collection: "posts".to_string(),
            },
        }]);
        assert!(destructive.is_recoverable());
        assert!(!MigrateError::config("bad dir").is_recoverable());
        assert!(!MigrateError::replay("missing collection").is_recoverable());
    }

    #[test]
    fn test_destructive_count_in_message() {
        let change = DestructiveChange {
            severity: Severity::High,
            category: ChangeCategory::FieldRemoval,
            description: "remove field `posts.title`".to_string(),
            origin: DiffOrigin::FieldRemove {
                collection: "posts".to_string(),
                field: "title".to_string(),
            },
        };
        let err = MigrateError::DestructiveChanges(vec![change.clone(), change]);
        assert!(err.to_string().starts_with("2 destructive change(s)"));
    }
}
