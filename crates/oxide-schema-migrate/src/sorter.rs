//! Dependency-aware ordering of actions.
//!
//! [`sort`] turns the unordered output of the differ into a sequence that can
//! be applied front to back: nothing is touched before it exists and nothing
//! is dropped while still referenced.
//!
//! The order is a topological sort over "must precede" edges between
//! actions, where ties are broken by a fixed key:
//!
//! 1. [`ActionKind`] priority: creates, structural additions and changes,
//!    foreign-key additions, foreign-key removals, index removals, column
//!    removals, drops. Foreign-key additions also wait for every structural
//!    addition, including an index re-added under a name it had to free.
//! 2. For creates and drops, the table's position in the foreign-key
//!    dependency order (referenced tables are created first and dropped
//!    last).
//! 3. Table name, then sub-entity name.
//!
//! Foreign keys never travel inline with a create or drop. They are split
//! out into separate actions first, which is what lets cyclic references of
//! any width be created in one batch.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use tracing::debug;

use crate::action::{Action, ActionKind};
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    kind: ActionKind,
    rank: usize,
    table: String,
    subentity: String,
    index: usize,
}

/// Orders `actions` so that every dependency is satisfied when each action
/// runs.
///
/// Returns [`MigrateError::DependencyCycle`] when the actions require each
/// other, e.g. a table that is both dropped and created in the same batch.
pub fn sort(actions: Vec<Action>) -> Result<Vec<Action>> {
    let actions = defer_foreign_keys(actions);
    let ranks = TableRanks::compute(&actions);

    let keys: Vec<SortKey> = actions
        .iter()
        .enumerate()
        .map(|(index, action)| SortKey {
            kind: action.kind(),
            rank: ranks.rank_of(action),
            table: action.table().to_string(),
            subentity: action.subentity().unwrap_or_default(),
            index,
        })
        .collect();

    let n = actions.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];
    let replaced = replaced_indexes(&actions);
    for (i, a) in actions.iter().enumerate() {
        for (j, b) in actions.iter().enumerate() {
            if i != j && must_precede(a, b, &replaced) {
                successors[i].push(j);
                in_degree[j] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<SortKey>> = keys
        .iter()
        .filter(|k| in_degree[k.index] == 0)
        .cloned()
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(key)) = ready.pop() {
        order.push(key.index);
        for &next in &successors[key.index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(keys[next].clone()));
            }
        }
    }

    if order.len() < n {
        let mut remaining: Vec<String> = (0..n)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| actions[i].log_line())
            .collect();
        remaining.sort();
        return Err(MigrateError::DependencyCycle { actions: remaining });
    }

    let mut slots: Vec<Option<Action>> = actions.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Splits foreign keys carried by creates and drops into separate actions.
fn defer_foreign_keys(actions: Vec<Action>) -> Vec<Action> {
    let mut out = Vec::with_capacity(actions.len());

    for action in actions {
        match action {
            Action::CreateTable { table } if !table.foreign_keys.is_empty() => {
                let name = table.name.clone();
                out.push(Action::CreateTable {
                    table: table.without_foreign_keys(),
                });
                for foreign_key in table.foreign_keys.into_values() {
                    out.push(Action::AddForeignKey {
                        table: name.clone(),
                        foreign_key,
                    });
                }
            }
            Action::DropTable { table } if !table.foreign_keys.is_empty() => {
                let name = table.name.clone();
                out.push(Action::DropTable {
                    table: table.without_foreign_keys(),
                });
                for foreign_key in table.foreign_keys.into_values() {
                    out.push(Action::RemoveForeignKey {
                        table: name.clone(),
                        foreign_key,
                    });
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// `(table, index)` pairs that are removed and added again in one batch.
fn replaced_indexes(actions: &[Action]) -> BTreeSet<(&str, &str)> {
    let added: BTreeSet<(&str, &str)> = actions
        .iter()
        .filter_map(|action| match action {
            Action::AddIndex { table, index } => Some((table.as_str(), index.name.as_str())),
            _ => None,
        })
        .collect();

    actions
        .iter()
        .filter_map(|action| match action {
            Action::RemoveIndex { table, index } => Some((table.as_str(), index.name.as_str())),
            _ => None,
        })
        .filter(|pair| added.contains(pair))
        .collect()
}

/// Whether `a` has to run before `b`.
///
/// `replaced` holds the indexes that [`replaced_indexes`] found in the batch.
fn must_precede(a: &Action, b: &Action, replaced: &BTreeSet<(&str, &str)>) -> bool {
    match (a, b) {
        // A table exists before anything touches it...
        (Action::CreateTable { table }, other) if touches(other, &table.name) => true,
        // ...and a name must be free before it is created again...
        (Action::DropTable { table: dropped }, Action::CreateTable { table: created }) => {
            dropped.name == created.name
        }
        // ...and nothing may touch it after it is dropped.
        (other, Action::DropTable { table }) => touches(other, &table.name),

        // Constraints go before the columns and indexes of their table.
        (
            Action::RemoveForeignKey { table, foreign_key },
            Action::RemoveColumn {
                table: t,
                column,
            },
        ) => {
            t == table
                || (*t == foreign_key.references_table
                    && foreign_key.references_columns.contains(&column.name))
        }
        (Action::RemoveForeignKey { table, .. }, Action::RemoveIndex { table: t, .. }) => {
            t == table
        }
        (Action::RemoveIndex { table, index }, Action::RemoveColumn { table: t, column }) => {
            t == table && index.columns.contains(&column.name)
        }

        // New columns exist before indexes and constraints use them.
        (Action::AddColumn { table, column }, Action::AddIndex { table: t, index }) => {
            t == table && index.columns.contains(&column.name)
        }

        // Foreign keys are added once the structure of every table is final.
        (
            Action::AddColumn { .. }
            | Action::ChangeColumn { .. }
            | Action::AddIndex { .. }
            | Action::ChangeTableOptions { .. },
            Action::AddForeignKey { .. },
        ) => true,
        (Action::RemoveIndex { table, index }, Action::AddForeignKey { .. }) => {
            replaced.contains(&(table.as_str(), index.name.as_str()))
        }

        // Replacements free the name before reusing it. Constraint names may
        // be unique across the whole schema.
        (Action::RemoveIndex { table, index }, Action::AddIndex { table: t, index: i }) => {
            t == table && i.name == index.name
        }
        (
            Action::RemoveForeignKey { table, foreign_key },
            Action::AddForeignKey {
                table: t,
                foreign_key: fk,
            },
        ) => (t == table && fk.key() == foreign_key.key()) || fk.name == foreign_key.name,
        (Action::RemoveColumn { table, column }, Action::AddColumn { table: t, column: c }) => {
            t == table && c.name == column.name
        }

        _ => false,
    }
}

/// Whether `action` operates on or references `table`.
fn touches(action: &Action, table: &str) -> bool {
    action.table() == table || action.referenced_table() == Some(table)
}

/// Position of each created and dropped table in foreign-key order.
#[derive(Debug, Default)]
struct TableRanks {
    create: BTreeMap<String, usize>,
    drop: BTreeMap<String, usize>,
}

impl TableRanks {
    fn compute(actions: &[Action]) -> Self {
        let mut created = BTreeSet::new();
        let mut dropped = BTreeSet::new();
        for action in actions {
            match action {
                Action::CreateTable { table } => {
                    created.insert(table.name.as_str());
                }
                Action::DropTable { table } => {
                    dropped.insert(table.name.as_str());
                }
                _ => {}
            }
        }

        // table -> tables that must come first
        let mut create_deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut drop_deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for action in actions {
            match action {
                Action::AddForeignKey { table, foreign_key } => {
                    let target = foreign_key.references_table.as_str();
                    if table != target
                        && created.contains(table.as_str())
                        && created.contains(target)
                    {
                        create_deps.entry(table.as_str()).or_default().insert(target);
                    }
                }
                Action::RemoveForeignKey { table, foreign_key } => {
                    let target = foreign_key.references_table.as_str();
                    if table != target
                        && dropped.contains(table.as_str())
                        && dropped.contains(target)
                    {
                        drop_deps.entry(target).or_default().insert(table.as_str());
                    }
                }
                _ => {}
            }
        }

        Self {
            create: rank_tables(&created, &create_deps),
            drop: rank_tables(&dropped, &drop_deps),
        }
    }

    fn rank_of(&self, action: &Action) -> usize {
        let ranks = match action {
            Action::CreateTable { .. } => &self.create,
            Action::DropTable { .. } => &self.drop,
            _ => return 0,
        };
        ranks.get(action.table()).copied().unwrap_or_default()
    }
}

/// Orders tables so each follows its dependencies, picking the smallest
/// name among the candidates. A cycle is broken at its smallest name: the
/// foreign keys involved are separate actions, so any order is safe.
fn rank_tables(
    tables: &BTreeSet<&str>,
    deps: &BTreeMap<&str, BTreeSet<&str>>,
) -> BTreeMap<String, usize> {
    let mut ranks = BTreeMap::new();
    let mut remaining = tables.clone();
    let mut rank = 0;

    while let Some(&first) = remaining.iter().next() {
        let next = remaining
            .iter()
            .copied()
            .find(|t| {
                deps.get(t)
                    .map_or(true, |d| d.iter().all(|dep| !remaining.contains(dep)))
            })
            .unwrap_or_else(|| {
                debug!(table = first, "Breaking foreign key cycle");
                first
            });

        remaining.remove(next);
        ranks.insert(next.to_string(), rank);
        rank += 1;
    }

    ranks
}
