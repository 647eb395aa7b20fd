//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support. Changing a column, adding or
//! dropping a foreign key, and table options all need the "table
//! recreation" strategy, which is not generated; those actions render as
//! comments.

use crate::action::Action;
use crate::schema::{ColumnDef, IndexDef, SqlType, TableDef};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generates SQL for creating a table, followed by its indexes.
    fn create_table_sql(&self, table: &TableDef) -> Vec<String> {
        let primary_key = table.primary_key();
        let inline_pk = primary_key.len() == 1;

        let mut defs: Vec<String> = table
            .columns
            .values()
            .map(|c| self.column_definition(c, inline_pk && c.primary_key))
            .collect();

        if primary_key.len() > 1 {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        defs.extend(
            table
                .foreign_keys
                .values()
                .map(|fk| self.foreign_key_clause(fk)),
        );

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            defs.join(",\n  ")
        )];
        statements.extend(
            table
                .indexes
                .values()
                .map(|index| self.create_index_sql(&table.name, index)),
        );
        statements
    }

    /// Generates SQL for adding a column.
    fn add_column_sql(&self, table: &str, column: &ColumnDef) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column, false)
        )
    }

    /// Generates SQL for dropping a column (SQLite 3.35.0+).
    fn drop_column_sql(&self, table: &str, column_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column_name)
        )
    }

    /// Generates SQL for creating an index. The index method is ignored.
    fn create_index_sql(&self, table: &str, index: &IndexDef) -> String {
        let quoted: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();

        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(table),
            quoted.join(", ")
        )
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, action: &Action) -> Vec<String> {
        match action {
            Action::CreateTable { table } => self.create_table_sql(table),

            Action::DropTable { table } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(&table.name))]
            }

            Action::AddColumn { table, column } => vec![self.add_column_sql(table, column)],

            Action::RemoveColumn { table, column } => {
                vec![self.drop_column_sql(table, &column.name)]
            }

            Action::ChangeColumn { table, after, .. } => vec![format!(
                "-- ALTER COLUMN not directly supported in SQLite. \
                 Table recreation required for: {}.{}",
                table, after.name
            )],

            Action::AddIndex { table, index } => vec![self.create_index_sql(table, index)],

            Action::RemoveIndex { index, .. } => {
                vec![format!("DROP INDEX {}", self.quote_identifier(&index.name))]
            }

            Action::AddForeignKey { table, foreign_key } => vec![format!(
                "-- Foreign key {} on {} cannot be added after table creation in SQLite. \
                 Table recreation required.",
                foreign_key.name, table
            )],

            Action::RemoveForeignKey { table, foreign_key } => vec![format!(
                "-- Foreign key {} on {} cannot be dropped in SQLite. \
                 Table recreation required.",
                foreign_key.name, table
            )],

            Action::ChangeTableOptions { table, .. } => {
                vec![format!("-- Table options are not supported in SQLite: {}", table)]
            }
        }
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Integer | SqlType::SmallInt | SqlType::BigInt => "INTEGER".to_string(),
            SqlType::Text | SqlType::Varchar(_) | SqlType::Char(_) => "TEXT".to_string(),
            SqlType::Boolean => "INTEGER".to_string(),
            SqlType::DateTime | SqlType::Timestamp | SqlType::Date | SqlType::Time => {
                "TEXT".to_string()
            }
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal(_, _) => "NUMERIC".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Json | SqlType::Uuid => "TEXT".to_string(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}
