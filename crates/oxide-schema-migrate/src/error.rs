//! Error types for the migration planner.

use std::path::PathBuf;

use crate::action::Action;

/// Errors that can occur while planning, persisting or executing migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The sorter could not find a dependency-safe order.
    #[error("Dependency cycle between actions: {}", .actions.join(", "))]
    DependencyCycle {
        /// Log lines of the actions left unordered.
        actions: Vec<String>,
    },

    /// An action referenced a missing entity or recreated an existing one.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Writing the backup, snapshot or migration artifact failed.
    #[error("Failed to persist '{path}': {source}")]
    Persistence {
        /// File being written.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migration artifact with the requested revision.
    #[error("Migration for revision {0} not found")]
    MigrationNotFound(u64),

    /// Database error during execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Why an executor run stopped before applying every action.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    /// An action failed against the target. Earlier actions stay applied;
    /// the failed action's own statements are rolled back.
    #[error("Action '{action}' failed after {applied} applied action(s): {source}")]
    Failed {
        /// Actions applied in this run before the failure.
        applied: usize,
        /// The action that failed.
        action: Box<Action>,
        /// Underlying error.
        source: MigrateError,
    },

    /// Cancellation was requested between two actions.
    #[error("Execution cancelled after {applied} applied action(s)")]
    Cancelled {
        /// Actions applied in this run before cancellation.
        applied: usize,
    },
}

impl ExecutionFailure {
    /// Number of actions applied in this run before stopping.
    #[must_use]
    pub fn applied(&self) -> usize {
        match self {
            Self::Failed { applied, .. } | Self::Cancelled { applied } => *applied,
        }
    }
}
