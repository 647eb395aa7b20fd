//! Migration planning.
//!
//! The planner runs the differ and the sorter twice: once from the previous
//! snapshot to the current one (`up`) and once the other way (`down`). The
//! down sequence is computed independently rather than by reversing `up`,
//! so it is itself dependency-safe.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::action::Action;
use crate::artifact::MigrationArtifact;
use crate::differ::diff;
use crate::error::Result;
use crate::schema::SchemaSnapshot;
use crate::sorter::sort;
use crate::state::SchemaState;
use crate::store::StateStore;

/// A planned migration together with the snapshot it leads to.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Snapshot to persist once the migration is committed.
    pub snapshot: SchemaSnapshot,
    /// The migration itself.
    pub artifact: MigrationArtifact,
}

/// Result of planning.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Previous and current schemas are identical.
    NoChanges,
    /// A migration was planned.
    Planned(Plan),
}

impl PlanOutcome {
    /// Returns the plan, if any.
    #[must_use]
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            Self::NoChanges => None,
            Self::Planned(plan) => Some(plan),
        }
    }
}

/// Plans migrations between two snapshots.
#[derive(Debug, Clone)]
pub struct MigrationPlanner {
    name: String,
    comment: String,
    created_at: Option<DateTime<Utc>>,
}

impl Default for MigrationPlanner {
    fn default() -> Self {
        Self::new("noname")
    }
}

impl MigrationPlanner {
    /// Creates a planner for a migration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            created_at: None,
        }
    }

    /// Sets the migration comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Pins the creation timestamp instead of using the current time.
    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Plans the migration from `previous` to `current`.
    ///
    /// The resulting revision is `previous.revision + 1`; the revision of
    /// `current` is ignored.
    pub fn plan(&self, previous: &SchemaSnapshot, current: &SchemaSnapshot) -> Result<PlanOutcome> {
        let up = sort(diff(previous, current))?;
        if up.is_empty() {
            info!("No changes found");
            return Ok(PlanOutcome::NoChanges);
        }
        let down = sort(diff(current, previous))?;

        let up_log = log_lines("up", &up);
        let down_log = log_lines("down", &down);

        check_replay("up", previous, current, &up);
        check_replay("down", current, previous, &down);

        let revision = previous.revision + 1;
        let artifact = MigrationArtifact {
            revision,
            name: self.name.clone(),
            comment: self.comment.clone(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            up,
            down,
            up_log,
            down_log,
        };

        Ok(PlanOutcome::Planned(Plan {
            snapshot: current.clone().with_revision(revision),
            artifact,
        }))
    }
}

fn log_lines(direction: &str, actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .map(|action| {
            let line = action.log_line();
            info!("[Actions {}] {}", direction, line);
            line
        })
        .collect()
}

/// Warns if `actions` do not take `from` to `to` on the model.
fn check_replay(direction: &str, from: &SchemaSnapshot, to: &SchemaSnapshot, actions: &[Action]) {
    match SchemaState::replay(from, actions) {
        Ok(result) if result.tables == to.tables => {}
        Ok(_) => warn!(direction, "Planned actions do not reproduce the target schema"),
        Err(e) => warn!(direction, error = %e, "Planned actions do not replay cleanly"),
    }
}

/// Loads the previous snapshot, plans against `current` and commits the
/// result to `store`.
///
/// Nothing is written when there are no changes.
pub fn create_migration<S: StateStore>(
    store: &mut S,
    current: &SchemaSnapshot,
    planner: &MigrationPlanner,
) -> Result<PlanOutcome> {
    let previous = store.load();
    let outcome = planner.plan(&previous, current)?;

    if let PlanOutcome::Planned(plan) = &outcome {
        store.save(&plan.snapshot, &plan.artifact)?;
        info!(
            revision = plan.artifact.revision,
            name = %plan.artifact.name,
            "New migration has been saved"
        );
    }

    Ok(outcome)
}
