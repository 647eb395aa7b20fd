//! Migration executor.
//!
//! Applies an ordered action sequence against a database, one action at a
//! time. Each action runs in its own transaction, so an action that renders
//! to several statements (a table and its indexes) is applied whole or not
//! at all. Execution stops at the first failure; actions already applied are
//! not rolled back.

use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::dialect::MigrationDialect;
use crate::error::{ExecutionFailure, Result};

/// Executes migration actions against a database.
pub struct MigrationExecutor<D: MigrationDialect> {
    pool: SqlitePool,
    dialect: D,
    dry_run: bool,
}

impl<D: MigrationDialect> MigrationExecutor<D> {
    /// Creates a new migration executor.
    pub fn new(pool: SqlitePool, dialect: D) -> Self {
        Self {
            pool,
            dialect,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Applies `actions` in order and returns how many were applied.
    ///
    /// `cancel` is checked before each action; an action that has started
    /// always runs to completion.
    pub async fn apply(
        &self,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> std::result::Result<usize, ExecutionFailure> {
        info!(
            dialect = self.dialect.name(),
            count = actions.len(),
            "Applying actions"
        );

        for (applied, action) in actions.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(applied, "Execution cancelled");
                return Err(ExecutionFailure::Cancelled { applied });
            }

            info!(action = %action, "Applying action");
            if let Err(source) = self.apply_one(action).await {
                warn!(action = %action, error = %source, applied, "Action failed");
                return Err(ExecutionFailure::Failed {
                    applied,
                    action: Box::new(action.clone()),
                    source,
                });
            }
        }

        info!(applied = actions.len(), "Actions applied successfully");
        Ok(actions.len())
    }

    async fn apply_one(&self, action: &Action) -> Result<()> {
        let statements = self.dialect.generate_sql(action);

        if self.dry_run {
            for sql in &statements {
                debug!(sql = %sql, "Dry run");
                println!("{};", sql);
            }
            return Ok(());
        }

        // Dropped without commit on error, which rolls back earlier statements.
        let mut tx = self.pool.begin().await?;
        for sql in &statements {
            if sql.starts_with("--") {
                warn!(comment = %sql, "Skipping comment (unsupported operation)");
                continue;
            }
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Generates SQL for actions without executing them.
    #[must_use]
    pub fn sql_for(&self, actions: &[Action]) -> Vec<String> {
        actions
            .iter()
            .flat_map(|action| self.dialect.generate_sql(action))
            .collect()
    }
}
