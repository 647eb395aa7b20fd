//! Migration actions.
//!
//! An [`Action`] is one atomic schema change. Every variant carries enough
//! payload to be applied or inverted without consulting the snapshots it was
//! computed from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnDef, ForeignKeyDef, IndexDef, TableDef};

/// Discriminant of an [`Action`], ordered by execution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// See [`Action::CreateTable`].
    CreateTable,
    /// See [`Action::AddColumn`].
    AddColumn,
    /// See [`Action::ChangeColumn`].
    ChangeColumn,
    /// See [`Action::AddIndex`].
    AddIndex,
    /// See [`Action::ChangeTableOptions`].
    ChangeTableOptions,
    /// See [`Action::AddForeignKey`].
    AddForeignKey,
    /// See [`Action::RemoveForeignKey`].
    RemoveForeignKey,
    /// See [`Action::RemoveIndex`].
    RemoveIndex,
    /// See [`Action::RemoveColumn`].
    RemoveColumn,
    /// See [`Action::DropTable`].
    DropTable,
}

impl ActionKind {
    /// Verb used in log lines.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::CreateTable => "createTable",
            Self::AddColumn => "addColumn",
            Self::ChangeColumn => "changeColumn",
            Self::AddIndex => "addIndex",
            Self::ChangeTableOptions => "changeTableOptions",
            Self::AddForeignKey => "addForeignKey",
            Self::RemoveForeignKey => "removeForeignKey",
            Self::RemoveIndex => "removeIndex",
            Self::RemoveColumn => "removeColumn",
            Self::DropTable => "dropTable",
        }
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Create a table. Foreign keys carried inline are split out into
    /// [`Action::AddForeignKey`] by the sorter.
    CreateTable {
        /// Full table definition.
        table: TableDef,
    },

    /// Drop a table. The full definition is kept so the drop can be inverted.
    DropTable {
        /// Full table definition.
        table: TableDef,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDef,
    },

    /// Remove a column from a table.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Definition of the column being removed.
        column: ColumnDef,
    },

    /// Change one or more attributes of a column.
    ChangeColumn {
        /// Table name.
        table: String,
        /// Column definition before the change.
        before: ColumnDef,
        /// Column definition after the change.
        after: ColumnDef,
    },

    /// Add an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexDef,
    },

    /// Remove an index.
    RemoveIndex {
        /// Table name.
        table: String,
        /// Definition of the index being removed.
        index: IndexDef,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Referencing table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKeyDef,
    },

    /// Remove a foreign key constraint.
    RemoveForeignKey {
        /// Referencing table name.
        table: String,
        /// Definition of the constraint being removed.
        foreign_key: ForeignKeyDef,
    },

    /// Replace the table option bag.
    ChangeTableOptions {
        /// Table name.
        table: String,
        /// Options before the change.
        before: BTreeMap<String, String>,
        /// Options after the change.
        after: BTreeMap<String, String>,
    },
}

impl Action {
    /// Returns the kind of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateTable { .. } => ActionKind::CreateTable,
            Self::DropTable { .. } => ActionKind::DropTable,
            Self::AddColumn { .. } => ActionKind::AddColumn,
            Self::RemoveColumn { .. } => ActionKind::RemoveColumn,
            Self::ChangeColumn { .. } => ActionKind::ChangeColumn,
            Self::AddIndex { .. } => ActionKind::AddIndex,
            Self::RemoveIndex { .. } => ActionKind::RemoveIndex,
            Self::AddForeignKey { .. } => ActionKind::AddForeignKey,
            Self::RemoveForeignKey { .. } => ActionKind::RemoveForeignKey,
            Self::ChangeTableOptions { .. } => ActionKind::ChangeTableOptions,
        }
    }

    /// Name of the table this action operates on.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table } | Self::DropTable { table } => &table.name,
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::RemoveIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::RemoveForeignKey { table, .. }
            | Self::ChangeTableOptions { table, .. } => table,
        }
    }

    /// Name of the affected column, index or foreign key, if any.
    #[must_use]
    pub fn subentity(&self) -> Option<String> {
        match self {
            Self::CreateTable { .. } | Self::DropTable { .. } | Self::ChangeTableOptions { .. } => {
                None
            }
            Self::AddColumn { column, .. } | Self::RemoveColumn { column, .. } => {
                Some(column.name.clone())
            }
            Self::ChangeColumn { after, .. } => Some(after.name.clone()),
            Self::AddIndex { index, .. } | Self::RemoveIndex { index, .. } => {
                Some(index.name.clone())
            }
            Self::AddForeignKey { foreign_key, .. } | Self::RemoveForeignKey { foreign_key, .. } => {
                Some(foreign_key.key())
            }
        }
    }

    /// Table referenced through a foreign key by this action, if it is a
    /// foreign-key action.
    #[must_use]
    pub fn referenced_table(&self) -> Option<&str> {
        match self {
            Self::AddForeignKey { foreign_key, .. } | Self::RemoveForeignKey { foreign_key, .. } => {
                Some(&foreign_key.references_table)
            }
            _ => None,
        }
    }

    /// Returns the exact inverse of this action.
    #[must_use]
    pub fn invert(&self) -> Self {
        match self {
            Self::CreateTable { table } => Self::DropTable {
                table: table.clone(),
            },
            Self::DropTable { table } => Self::CreateTable {
                table: table.clone(),
            },
            Self::AddColumn { table, column } => Self::RemoveColumn {
                table: table.clone(),
                column: column.clone(),
            },
            Self::RemoveColumn { table, column } => Self::AddColumn {
                table: table.clone(),
                column: column.clone(),
            },
            Self::ChangeColumn {
                table,
                before,
                after,
            } => Self::ChangeColumn {
                table: table.clone(),
                before: after.clone(),
                after: before.clone(),
            },
            Self::AddIndex { table, index } => Self::RemoveIndex {
                table: table.clone(),
                index: index.clone(),
            },
            Self::RemoveIndex { table, index } => Self::AddIndex {
                table: table.clone(),
                index: index.clone(),
            },
            Self::AddForeignKey { table, foreign_key } => Self::RemoveForeignKey {
                table: table.clone(),
                foreign_key: foreign_key.clone(),
            },
            Self::RemoveForeignKey { table, foreign_key } => Self::AddForeignKey {
                table: table.clone(),
                foreign_key: foreign_key.clone(),
            },
            Self::ChangeTableOptions {
                table,
                before,
                after,
            } => Self::ChangeTableOptions {
                table: table.clone(),
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    /// Human-readable log line: `<verb> <table>[.<subentity>]`.
    #[must_use]
    pub fn log_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind().verb(), self.table())?;
        if let Some(sub) = self.subentity() {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, SqlType};

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", SqlType::BigInt).primary_key())
            .column(ColumnDef::new("name", SqlType::Varchar(255)))
    }

    #[test]
    fn test_create_table_inverts_to_drop() {
        let action = Action::CreateTable { table: users() };
        match action.invert() {
            Action::DropTable { table } => assert_eq!(table, users()),
            other => panic!("Expected DropTable, got {:?}", other),
        }
    }

    #[test]
    fn test_change_column_inverts_by_swapping() {
        let before = ColumnDef::new("age", SqlType::Integer);
        let after = ColumnDef::new("age", SqlType::BigInt).not_null();
        let action = Action::ChangeColumn {
            table: "users".to_string(),
            before: before.clone(),
            after: after.clone(),
        };

        assert_eq!(
            action.invert(),
            Action::ChangeColumn {
                table: "users".to_string(),
                before: after,
                after: before,
            }
        );
    }

    #[test]
    fn test_invert_is_involution() {
        let actions = vec![
            Action::DropTable { table: users() },
            Action::RemoveColumn {
                table: "users".to_string(),
                column: ColumnDef::new("email", SqlType::Text),
            },
            Action::RemoveIndex {
                table: "users".to_string(),
                index: IndexDef::new("idx_name", ["name"]),
            },
            Action::RemoveForeignKey {
                table: "posts".to_string(),
                foreign_key: ForeignKeyDef::new("user_id", "users", "id")
                    .on_delete(ForeignKeyAction::Cascade),
            },
            Action::ChangeTableOptions {
                table: "users".to_string(),
                before: BTreeMap::new(),
                after: BTreeMap::from([("engine".to_string(), "InnoDB".to_string())]),
            },
        ];

        for action in actions {
            assert_ne!(action.invert(), action);
            assert_eq!(action.invert().invert(), action);
        }
    }

    #[test]
    fn test_log_lines() {
        let create = Action::CreateTable { table: users() };
        assert_eq!(create.log_line(), "createTable users");

        let add = Action::AddColumn {
            table: "users".to_string(),
            column: ColumnDef::new("email", SqlType::Text),
        };
        assert_eq!(add.log_line(), "addColumn users.email");

        let fk = Action::AddForeignKey {
            table: "posts".to_string(),
            foreign_key: ForeignKeyDef::new("user_id", "users", "id"),
        };
        assert_eq!(fk.log_line(), "addForeignKey posts.user_id");
        assert_eq!(fk.referenced_table(), Some("users"));
    }

    #[test]
    fn test_kind_priority_order() {
        assert!(ActionKind::CreateTable < ActionKind::AddColumn);
        assert!(ActionKind::AddIndex < ActionKind::AddForeignKey);
        assert!(ActionKind::RemoveForeignKey < ActionKind::RemoveColumn);
        assert!(ActionKind::RemoveColumn < ActionKind::DropTable);
    }
}
