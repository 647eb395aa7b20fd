//! Structural schema diff.
//!
//! This module compares two snapshots and produces the unordered set of
//! actions that transforms the first into the second. It knows nothing about
//! dependencies between those actions; ordering is the sorter's job.
//!
//! Indexes and foreign keys are never altered in place. A changed index or
//! constraint is emitted as a remove + add pair.

use std::collections::BTreeMap;

use crate::action::Action;
use crate::schema::{ColumnDef, ForeignKeyDef, IndexDef, SchemaSnapshot, TableDef};

/// Compares two snapshots and returns the actions needed to transform
/// `before` into `after`.
///
/// Revisions are ignored. The result is deterministic: tables, then
/// sub-entities, are visited in name order.
#[must_use]
pub fn diff(before: &SchemaSnapshot, after: &SchemaSnapshot) -> Vec<Action> {
    let mut actions = Vec::new();

    // Tables to create (in after but not in before)
    for (name, table) in &after.tables {
        if !before.tables.contains_key(name) {
            actions.push(Action::CreateTable {
                table: table.clone(),
            });
        }
    }

    // Tables to drop (in before but not in after)
    for (name, table) in &before.tables {
        if !after.tables.contains_key(name) {
            actions.push(Action::DropTable {
                table: table.clone(),
            });
        }
    }

    // Tables that exist in both (may have changes)
    for (name, from) in &before.tables {
        if let Some(to) = after.tables.get(name) {
            actions.extend(diff_table(from, to));
        }
    }

    actions
}

/// Compares two versions of the same table.
fn diff_table(from: &TableDef, to: &TableDef) -> Vec<Action> {
    let mut actions = Vec::new();
    let table = &to.name;

    actions.extend(diff_columns(table, &from.columns, &to.columns));
    actions.extend(diff_indexes(table, &from.indexes, &to.indexes));
    actions.extend(diff_foreign_keys(
        table,
        &from.foreign_keys,
        &to.foreign_keys,
    ));

    if from.options != to.options {
        actions.push(Action::ChangeTableOptions {
            table: table.clone(),
            before: from.options.clone(),
            after: to.options.clone(),
        });
    }

    actions
}

fn diff_columns(
    table: &str,
    from: &BTreeMap<String, ColumnDef>,
    to: &BTreeMap<String, ColumnDef>,
) -> Vec<Action> {
    let mut actions = Vec::new();

    // New columns
    for (name, column) in to {
        if !from.contains_key(name) {
            actions.push(Action::AddColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }
    }

    // Removed columns
    for (name, column) in from {
        if !to.contains_key(name) {
            actions.push(Action::RemoveColumn {
                table: table.to_string(),
                column: column.clone(),
            });
        }
    }

    // Modified columns: any tracked attribute differs
    for (name, before) in from {
        if let Some(after) = to.get(name) {
            if before != after {
                actions.push(Action::ChangeColumn {
                    table: table.to_string(),
                    before: before.clone(),
                    after: after.clone(),
                });
            }
        }
    }

    actions
}

fn diff_indexes(
    table: &str,
    from: &BTreeMap<String, IndexDef>,
    to: &BTreeMap<String, IndexDef>,
) -> Vec<Action> {
    let mut actions = Vec::new();

    for (name, index) in to {
        match from.get(name) {
            None => actions.push(Action::AddIndex {
                table: table.to_string(),
                index: index.clone(),
            }),
            // Modified indexes are replaced, never altered
            Some(old) if old != index => {
                actions.push(Action::RemoveIndex {
                    table: table.to_string(),
                    index: old.clone(),
                });
                actions.push(Action::AddIndex {
                    table: table.to_string(),
                    index: index.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (name, index) in from {
        if !to.contains_key(name) {
            actions.push(Action::RemoveIndex {
                table: table.to_string(),
                index: index.clone(),
            });
        }
    }

    actions
}

fn diff_foreign_keys(
    table: &str,
    from: &BTreeMap<String, ForeignKeyDef>,
    to: &BTreeMap<String, ForeignKeyDef>,
) -> Vec<Action> {
    let mut actions = Vec::new();

    for (key, fk) in to {
        match from.get(key) {
            None => actions.push(Action::AddForeignKey {
                table: table.to_string(),
                foreign_key: fk.clone(),
            }),
            // Constraint alteration is not portable: drop + recreate
            Some(old) if old != fk => {
                actions.push(Action::RemoveForeignKey {
                    table: table.to_string(),
                    foreign_key: old.clone(),
                });
                actions.push(Action::AddForeignKey {
                    table: table.to_string(),
                    foreign_key: fk.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (key, fk) in from {
        if !to.contains_key(key) {
            actions.push(Action::RemoveForeignKey {
                table: table.to_string(),
                foreign_key: fk.clone(),
            });
        }
    }

    actions
}
