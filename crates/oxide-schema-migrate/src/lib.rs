//! Schema diffing and reversible migration planning.
//!
//! `oxide-schema-migrate` compares the last recorded schema snapshot with
//! the schema the application currently describes, and produces an ordered,
//! reversible migration:
//! - Changes are computed structurally, down to columns, indexes, foreign
//!   keys and table options
//! - Actions are ordered so that nothing is referenced before it exists or
//!   dropped while still referenced
//! - Every migration carries an independently planned `down` sequence
//!
//! # Architecture
//!
//! - **Schema** - Snapshot model: tables, columns, indexes, foreign keys
//! - **Differ** - Unordered actions between two snapshots
//! - **Sorter** - Dependency-safe, deterministic action order
//! - **Planner** - Up and down sequences packaged as an artifact
//! - **Store** - Committed snapshot, backup slot and artifact files
//! - **Executor** - Applies actions to a database, dialect-aware
//!
//! # Example
//!
//! ```rust
//! use oxide_schema_migrate::prelude::*;
//!
//! let previous = SchemaSnapshot::new();
//! let current = SchemaSnapshot::new().table(
//!     TableDef::new("users")
//!         .column(ColumnDef::new("id", SqlType::BigInt).primary_key().auto_increment())
//!         .column(ColumnDef::new("email", SqlType::Varchar(255)).not_null())
//!         .index(IndexDef::new("idx_users_email", ["email"]).unique()),
//! );
//!
//! let outcome = MigrationPlanner::new("initial").plan(&previous, &current)?;
//! if let PlanOutcome::Planned(plan) = outcome {
//!     assert_eq!(plan.artifact.revision, 1);
//!     assert_eq!(plan.artifact.up_log, vec!["createTable users"]);
//!     assert_eq!(plan.artifact.down_log, vec!["dropTable users"]);
//! }
//! # Ok::<(), MigrateError>(())
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Plan a migration from a schema description and commit it
//! oxide-schema-migrate create --schema schema.json --name add_email
//!
//! # Preview without writing anything
//! oxide-schema-migrate create --schema schema.json --preview
//!
//! # Show the committed revision and migration files
//! oxide-schema-migrate status
//!
//! # Show the rollback SQL of revision 3
//! oxide-schema-migrate sql --revision 3 --down
//! ```

pub mod action;
pub mod artifact;
pub mod dialect;
pub mod differ;
pub mod error;
pub mod executor;
pub mod planner;
pub mod schema;
pub mod sorter;
pub mod state;
pub mod store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::action::{Action, ActionKind};
    pub use crate::artifact::{generate_migration_name, Direction, MigrationArtifact, MigrationWriter};
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::differ::diff;
    pub use crate::error::{ExecutionFailure, MigrateError, Result};
    pub use crate::executor::MigrationExecutor;
    pub use crate::planner::{create_migration, MigrationPlanner, Plan, PlanOutcome};
    pub use crate::schema::{
        ColumnDef, DefaultValue, ForeignKeyAction, ForeignKeyDef, IndexDef, SchemaSnapshot,
        SqlType, TableDef,
    };
    pub use crate::sorter::sort;
    pub use crate::state::SchemaState;
    pub use crate::store::{FileStateStore, MemoryStateStore, StateStore};
}
