//! End-to-end planning tests.
//!
//! These tests run the planner over a set of schema fixtures and check the
//! resulting migrations on the model: every planned sequence must replay
//! cleanly and land exactly on its target schema.

use std::fs;

use chrono::{DateTime, Utc};
use oxide_schema_migrate::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Fixtures
// =============================================================================

fn id() -> ColumnDef {
    ColumnDef::new("id", SqlType::Integer).primary_key()
}

fn users() -> TableDef {
    TableDef::new("users")
        .column(id())
        .column(ColumnDef::new("name", SqlType::Varchar(255)))
}

fn empty() -> SchemaSnapshot {
    SchemaSnapshot::new()
}

fn users_only() -> SchemaSnapshot {
    SchemaSnapshot::new().table(users())
}

fn users_with_email() -> SchemaSnapshot {
    SchemaSnapshot::new().table(users().column(ColumnDef::new("email", SqlType::Varchar(255))))
}

fn a_and_b() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .table(TableDef::new("a").column(id()))
        .table(
            TableDef::new("b")
                .column(id())
                .column(ColumnDef::new("a_id", SqlType::Integer))
                .foreign_key(ForeignKeyDef::new("a_id", "a", "id")),
        )
}

fn mutual() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .table(
            TableDef::new("a")
                .column(id())
                .column(ColumnDef::new("b_id", SqlType::Integer))
                .foreign_key(ForeignKeyDef::new("b_id", "b", "id")),
        )
        .table(
            TableDef::new("b")
                .column(id())
                .column(ColumnDef::new("a_id", SqlType::Integer))
                .foreign_key(ForeignKeyDef::new("a_id", "a", "id")),
        )
}

fn blog() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .table(users())
        .table(
            TableDef::new("posts")
                .column(id())
                .column(ColumnDef::new("author_id", SqlType::Integer).not_null())
                .column(ColumnDef::new("title", SqlType::Varchar(200)).not_null())
                .column(ColumnDef::new("body", SqlType::Text))
                .index(IndexDef::new("idx_posts_author", ["author_id"]))
                .foreign_key(
                    ForeignKeyDef::new("author_id", "users", "id")
                        .on_delete(ForeignKeyAction::Cascade),
                )
                .option("engine", "InnoDB"),
        )
        .table(
            TableDef::new("comments")
                .column(id())
                .column(ColumnDef::new("post_id", SqlType::Integer).not_null())
                .column(ColumnDef::new("author_id", SqlType::Integer))
                .foreign_key(ForeignKeyDef::new("post_id", "posts", "id"))
                .foreign_key(
                    ForeignKeyDef::new("author_id", "users", "id")
                        .on_delete(ForeignKeyAction::SetNull),
                ),
        )
}

/// Blog where posts point at a new `authors` table and users are gone.
fn retargeted_blog() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .table(TableDef::new("authors").column(id()))
        .table(
            TableDef::new("posts")
                .column(id())
                .column(ColumnDef::new("author_id", SqlType::Integer).not_null())
                .column(ColumnDef::new("title", SqlType::Text).not_null())
                .foreign_key(ForeignKeyDef::new("author_id", "authors", "id")),
        )
}

fn fixtures() -> Vec<SchemaSnapshot> {
    vec![
        empty(),
        users_only(),
        users_with_email(),
        a_and_b(),
        mutual(),
        blog(),
        retargeted_blog(),
    ]
}

fn at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn plan(previous: &SchemaSnapshot, current: &SchemaSnapshot) -> Option<Plan> {
    match MigrationPlanner::new("test")
        .created_at(at())
        .plan(previous, current)
        .unwrap()
    {
        PlanOutcome::Planned(plan) => Some(plan),
        PlanOutcome::NoChanges => None,
    }
}

fn lines(actions: &[Action]) -> Vec<String> {
    actions.iter().map(Action::log_line).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_create_first_table() {
    let plan = plan(&empty(), &users_only()).unwrap();

    assert_eq!(plan.artifact.up, vec![Action::CreateTable { table: users() }]);
    assert_eq!(plan.artifact.down, vec![Action::DropTable { table: users() }]);
    assert_eq!(plan.artifact.revision, 1);
}

#[test]
fn test_scenario_add_column() {
    let plan = plan(&users_only(), &users_with_email()).unwrap();
    let email = ColumnDef::new("email", SqlType::Varchar(255));

    assert_eq!(
        plan.artifact.up,
        vec![Action::AddColumn {
            table: "users".to_string(),
            column: email.clone(),
        }]
    );
    assert_eq!(
        plan.artifact.down,
        vec![Action::RemoveColumn {
            table: "users".to_string(),
            column: email,
        }]
    );
}

#[test]
fn test_scenario_foreign_key_ordering() {
    let plan = plan(&empty(), &a_and_b()).unwrap();

    assert_eq!(
        plan.artifact.up_log,
        vec!["createTable a", "createTable b", "addForeignKey b.a_id"]
    );
    assert_eq!(
        plan.artifact.down_log,
        vec!["removeForeignKey b.a_id", "dropTable b", "dropTable a"]
    );
}

#[test]
fn test_scenario_no_changes_leaves_state_untouched() {
    let dir = TempDir::new().unwrap();
    let mut store = FileStateStore::new(dir.path());

    let outcome = create_migration(&mut store, &blog(), &MigrationPlanner::new("blog")).unwrap();
    assert!(outcome.plan().is_some());
    let before = fs::read(store.current_path()).unwrap();

    let outcome = create_migration(&mut store, &blog(), &MigrationPlanner::new("again")).unwrap();
    assert_eq!(outcome, PlanOutcome::NoChanges);

    assert_eq!(fs::read(store.current_path()).unwrap(), before);
    assert!(!store.backup_path().exists());
    assert_eq!(store.writer().list().unwrap().len(), 1);
}

#[test]
fn test_scenario_mutual_foreign_keys() {
    let plan = plan(&empty(), &mutual()).unwrap();
    let up = &plan.artifact.up;

    assert_eq!(
        lines(up),
        vec![
            "createTable a",
            "createTable b",
            "addForeignKey a.b_id",
            "addForeignKey b.a_id"
        ]
    );
    for action in &up[..2] {
        match action {
            Action::CreateTable { table } => assert!(table.foreign_keys.is_empty()),
            other => panic!("Expected CreateTable, got {:?}", other),
        }
    }
}

#[test]
fn test_scenario_retarget_foreign_key() {
    let plan = plan(&blog(), &retargeted_blog()).unwrap();
    let up = lines(&plan.artifact.up);

    let position = |line: &str| up.iter().position(|l| l == line).unwrap();
    assert!(position("createTable authors") < position("addForeignKey posts.author_id"));
    assert!(position("removeForeignKey posts.author_id") < position("addForeignKey posts.author_id"));
    assert!(position("removeForeignKey posts.author_id") < position("dropTable users"));
    assert!(position("dropTable comments") < position("dropTable users"));
    assert!(position("removeIndex posts.idx_posts_author") < position("removeColumn posts.body"));
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_diff_with_itself_is_empty() {
    for schema in fixtures() {
        assert!(diff(&schema, &schema).is_empty());
        assert!(plan(&schema, &schema).is_none());
    }
}

#[test]
fn test_plans_replay_onto_target() {
    for from in fixtures() {
        for to in fixtures() {
            let Some(plan) = plan(&from, &to) else {
                continue;
            };

            let forward = SchemaState::replay(&from, &plan.artifact.up).unwrap();
            assert_eq!(forward.tables, to.tables);

            let back = SchemaState::replay(&forward, &plan.artifact.down).unwrap();
            assert_eq!(back.tables, from.tables);
        }
    }
}

#[test]
fn test_down_agrees_with_inverted_up() {
    for from in fixtures() {
        for to in fixtures() {
            let Some(plan) = plan(&from, &to) else {
                continue;
            };

            let mut inverted: Vec<String> = plan
                .artifact
                .up
                .iter()
                .map(|a| a.invert().log_line())
                .collect();
            let mut down = plan.artifact.down_log.clone();
            inverted.sort();
            down.sort();
            assert_eq!(inverted, down);
        }
    }
}

#[test]
fn test_planning_is_deterministic() {
    for from in fixtures() {
        for to in fixtures() {
            let first = plan(&from, &to);
            let second = plan(&from, &to);
            assert_eq!(first, second);

            if let (Some(a), Some(b)) = (first, second) {
                assert_eq!(
                    serde_json::to_string_pretty(&a.artifact).unwrap(),
                    serde_json::to_string_pretty(&b.artifact).unwrap()
                );
            }
        }
    }
}

#[test]
fn test_sort_ignores_input_order() {
    for from in fixtures() {
        for to in fixtures() {
            let actions = diff(&from, &to);
            let mut reversed = actions.clone();
            reversed.reverse();
            assert_eq!(sort(actions).unwrap(), sort(reversed).unwrap());
        }
    }
}

#[test]
fn test_revision_counts_commits() {
    let mut store = MemoryStateStore::new();
    let sequence = fixtures();

    for (i, schema) in sequence.iter().enumerate().skip(1) {
        let outcome =
            create_migration(&mut store, schema, &MigrationPlanner::new(format!("step{}", i)))
                .unwrap();
        assert_eq!(outcome.plan().map(|p| p.artifact.revision), Some(i as u64));
    }

    assert_eq!(store.load().revision, sequence.len() as u64 - 1);
    let revisions: Vec<u64> = store.artifacts().iter().map(|a| a.revision).collect();
    assert_eq!(revisions, (1..sequence.len() as u64).collect::<Vec<_>>());
}

#[test]
fn test_file_store_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut store = FileStateStore::new(dir.path().join("migrations"));

    create_migration(&mut store, &blog(), &MigrationPlanner::new("blog")).unwrap();
    let outcome = create_migration(
        &mut store,
        &retargeted_blog(),
        &MigrationPlanner::new("authors").comment("split authors out"),
    )
    .unwrap();
    let planned = outcome.plan().unwrap();

    let loaded = store.load();
    assert_eq!(loaded.revision, 2);
    assert_eq!(loaded.tables, retargeted_blog().tables);
    assert_eq!(store.load_backup().unwrap().unwrap().tables, blog().tables);

    let artifact = store.writer().find(2).unwrap();
    assert_eq!(artifact, planned.artifact);
    assert_eq!(artifact.comment, "split authors out");
}

#[test]
fn test_failed_commit_leaves_files_untouched() {
    let dir = TempDir::new().unwrap();
    let mut store = FileStateStore::new(dir.path());
    create_migration(&mut store, &users_only(), &MigrationPlanner::new("users")).unwrap();
    create_migration(&mut store, &blog(), &MigrationPlanner::new("blog")).unwrap();

    let current = fs::read(store.current_path()).unwrap();
    let backup = fs::read(store.backup_path()).unwrap();
    let migrations = store.writer().list().unwrap();

    // Block the staging file of the snapshot so the swap fails midway.
    fs::create_dir(dir.path().join("_current.json.tmp")).unwrap();
    let result = create_migration(
        &mut store,
        &retargeted_blog(),
        &MigrationPlanner::new("authors"),
    );

    assert!(matches!(result, Err(MigrateError::Persistence { .. })));
    assert_eq!(fs::read(store.current_path()).unwrap(), current);
    assert_eq!(fs::read(store.backup_path()).unwrap(), backup);
    assert_eq!(store.writer().list().unwrap(), migrations);
    assert_eq!(store.load().tables, blog().tables);
    assert_eq!(store.load_backup().unwrap().unwrap().tables, users_only().tables);
}
