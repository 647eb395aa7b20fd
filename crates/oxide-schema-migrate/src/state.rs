//! Simulated application of actions.
//!
//! [`SchemaState`] replays actions onto an in-memory snapshot, checking that
//! every entity an action touches exists when it runs and that nothing is
//! dropped while still referenced. It is the model-level stand-in for a
//! live database and is used to verify that a planned sequence is
//! dependency-safe and lands on the expected schema.

use crate::action::Action;
use crate::error::{MigrateError, Result};
use crate::schema::{ForeignKeyDef, SchemaSnapshot, TableDef};

/// A schema being transformed one action at a time.
#[derive(Debug, Clone, Default)]
pub struct SchemaState {
    schema: SchemaSnapshot,
}

impl SchemaState {
    /// Starts from the given snapshot.
    #[must_use]
    pub fn new(schema: SchemaSnapshot) -> Self {
        Self { schema }
    }

    /// Returns the current schema.
    #[must_use]
    pub fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    /// Consumes and returns the schema.
    #[must_use]
    pub fn into_schema(self) -> SchemaSnapshot {
        self.schema
    }

    /// Applies actions in order, stopping at the first one that cannot run.
    pub fn apply_all<'a>(&mut self, actions: impl IntoIterator<Item = &'a Action>) -> Result<()> {
        for action in actions {
            self.apply_action(action)?;
        }
        Ok(())
    }

    /// Replays `actions` onto a copy of `schema` and returns the result.
    pub fn replay(schema: &SchemaSnapshot, actions: &[Action]) -> Result<SchemaSnapshot> {
        let mut state = Self::new(schema.clone());
        state.apply_all(actions)?;
        Ok(state.into_schema())
    }

    /// Applies a single action.
    pub fn apply_action(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::CreateTable { table } => {
                if self.schema.tables.contains_key(&table.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{}' already exists",
                        table.name
                    )));
                }
                for fk in table.foreign_keys.values() {
                    if fk.references_table != table.name {
                        self.check_reference(&table.name, fk)?;
                    }
                }
                self.schema.tables.insert(table.name.clone(), table.clone());
            }

            Action::DropTable { table } => {
                let existing = self.table_mut(&table.name)?;
                if existing.without_foreign_keys() != table.without_foreign_keys() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{}' does not match the expected definition",
                        table.name
                    )));
                }
                if let Some(referencing) = self.referencing_table(&table.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{}' is still referenced by '{}'",
                        table.name, referencing
                    )));
                }
                self.schema.tables.remove(&table.name);
            }

            Action::AddColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.columns.contains_key(&column.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}' already exists in table '{}'",
                        column.name, table
                    )));
                }
                t.columns.insert(column.name.clone(), column.clone());
            }

            Action::RemoveColumn { table, column } => {
                if let Some(user) = self.column_user(table, &column.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}.{}' is still used by {}",
                        table, column.name, user
                    )));
                }
                let t = self.table_mut(table)?;
                if t.columns.remove(&column.name).is_none() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{}' does not exist in table '{}'",
                        column.name, table
                    )));
                }
            }

            Action::ChangeColumn {
                table,
                before,
                after,
            } => {
                let t = self.table_mut(table)?;
                match t.columns.get_mut(&before.name) {
                    Some(col) if col == before => *col = after.clone(),
                    Some(_) => {
                        return Err(MigrateError::InvalidState(format!(
                            "Column '{}' in table '{}' does not match the expected definition",
                            before.name, table
                        )));
                    }
                    None => {
                        return Err(MigrateError::InvalidState(format!(
                            "Column '{}' does not exist in table '{}'",
                            before.name, table
                        )));
                    }
                }
            }

            Action::AddIndex { table, index } => {
                let t = self.table_mut(table)?;
                if t.indexes.contains_key(&index.name) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' already exists on table '{}'",
                        index.name, table
                    )));
                }
                if let Some(missing) = index.columns.iter().find(|c| !t.columns.contains_key(*c)) {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' uses missing column '{}.{}'",
                        index.name, table, missing
                    )));
                }
                t.indexes.insert(index.name.clone(), index.clone());
            }

            Action::RemoveIndex { table, index } => {
                let t = self.table_mut(table)?;
                if t.indexes.remove(&index.name).is_none() {
                    return Err(MigrateError::InvalidState(format!(
                        "Index '{}' does not exist on table '{}'",
                        index.name, table
                    )));
                }
            }

            Action::AddForeignKey { table, foreign_key } => {
                self.check_reference(table, foreign_key)?;
                let t = self.table_mut(table)?;
                if let Some(missing) = foreign_key
                    .columns
                    .iter()
                    .find(|c| !t.columns.contains_key(*c))
                {
                    return Err(MigrateError::InvalidState(format!(
                        "Foreign key on '{}' uses missing column '{}'",
                        table, missing
                    )));
                }
                if t
                    .foreign_keys
                    .insert(foreign_key.key(), foreign_key.clone())
                    .is_some()
                {
                    return Err(MigrateError::InvalidState(format!(
                        "Foreign key '{}' already exists on table '{}'",
                        foreign_key.key(),
                        table
                    )));
                }
            }

            Action::RemoveForeignKey { table, foreign_key } => {
                let t = self.table_mut(table)?;
                if t.foreign_keys.remove(&foreign_key.key()).is_none() {
                    return Err(MigrateError::InvalidState(format!(
                        "Foreign key '{}' does not exist on table '{}'",
                        foreign_key.key(),
                        table
                    )));
                }
            }

            Action::ChangeTableOptions { table, after, .. } => {
                let t = self.table_mut(table)?;
                t.options = after.clone();
            }
        }

        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableDef> {
        self.schema
            .tables
            .get_mut(name)
            .ok_or_else(|| MigrateError::InvalidState(format!("Table '{}' does not exist", name)))
    }

    /// Checks that the table and columns a foreign key points at exist.
    fn check_reference(&self, table: &str, fk: &ForeignKeyDef) -> Result<()> {
        let target = self.schema.get_table(&fk.references_table).ok_or_else(|| {
            MigrateError::InvalidState(format!(
                "Foreign key from '{}' references non-existent table '{}'",
                table, fk.references_table
            ))
        })?;
        if let Some(missing) = fk
            .references_columns
            .iter()
            .find(|c| !target.columns.contains_key(*c))
        {
            return Err(MigrateError::InvalidState(format!(
                "Foreign key from '{}' references non-existent column '{}.{}'",
                table, fk.references_table, missing
            )));
        }
        Ok(())
    }

    /// The first index or foreign key that still uses `table.column`,
    /// including foreign keys in other tables that point at it.
    fn column_user(&self, table: &str, column: &str) -> Option<String> {
        let owner = self.schema.get_table(table)?;
        let uses = |columns: &[String]| columns.iter().any(|c| c == column);

        if let Some(index) = owner.indexes.values().find(|i| uses(&i.columns)) {
            return Some(format!("index '{}'", index.name));
        }
        if let Some(fk) = owner.foreign_keys.values().find(|fk| uses(&fk.columns)) {
            return Some(format!("foreign key '{}'", fk.name));
        }
        self.schema.tables.values().find_map(|t| {
            t.foreign_keys
                .values()
                .find(|fk| fk.references_table == table && uses(&fk.references_columns))
                .map(|fk| format!("foreign key '{}' on '{}'", fk.name, t.name))
        })
    }

    /// First table other than `name` holding a foreign key to `name`.
    fn referencing_table(&self, name: &str) -> Option<&str> {
        self.schema
            .tables
            .values()
            .find(|t| t.name != name && t.referenced_tables().any(|r| r == name))
            .map(|t| t.name.as_str())
    }
}
