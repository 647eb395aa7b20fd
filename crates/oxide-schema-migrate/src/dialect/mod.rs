//! Database dialect implementations.
//!
//! Each dialect knows how to render migration actions as SQL for a
//! specific database system. Actions a dialect cannot express are rendered
//! as `--` comment lines, which the executor skips.

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::action::Action;
use crate::schema::{ColumnDef, ForeignKeyDef, SqlType};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates SQL for a migration action.
    fn generate_sql(&self, action: &Action) -> Vec<String>;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Generates column definition SQL.
    ///
    /// `inline_pk` renders the primary key constraint on the column itself;
    /// composite keys are declared at table level instead.
    fn column_definition(&self, column: &ColumnDef, inline_pk: bool) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if inline_pk {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        } else if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        parts.join(" ")
    }

    /// Generates a table-level foreign key clause.
    fn foreign_key_clause(&self, fk: &ForeignKeyDef) -> String {
        let quote_all = |names: &[String]| {
            names
                .iter()
                .map(|n| self.quote_identifier(n))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_all(&fk.columns),
            self.quote_identifier(&fk.references_table),
            quote_all(&fk.references_columns),
            fk.on_delete.to_sql(),
            fk.on_update.to_sql()
        )
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name)
    }
}
