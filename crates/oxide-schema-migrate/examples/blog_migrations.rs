//! Example: Blog Schema Evolution
//!
//! This example plans three migrations for a blog application as its schema
//! grows (users, then posts and comments, then tags), applies them to an
//! in-memory SQLite database, and rolls the last one back.
//!
//! Run with: cargo run --example blog_migrations -p oxide-schema-migrate

use oxide_schema_migrate::prelude::*;
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Schema Versions
// =============================================================================

fn users() -> TableDef {
    TableDef::new("users")
        .column(
            ColumnDef::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnDef::new("username", SqlType::Varchar(100)).not_null())
        .column(ColumnDef::new("email", SqlType::Varchar(255)).not_null())
        .column(
            ColumnDef::new("created_at", SqlType::Timestamp)
                .not_null()
                .default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())),
        )
        .index(IndexDef::new("idx_users_username", ["username"]).unique())
}

fn posts() -> TableDef {
    TableDef::new("posts")
        .column(
            ColumnDef::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnDef::new("author_id", SqlType::BigInt).not_null())
        .column(ColumnDef::new("title", SqlType::Varchar(200)).not_null())
        .column(ColumnDef::new("content", SqlType::Text).not_null())
        .foreign_key(
            ForeignKeyDef::new("author_id", "users", "id").on_delete(ForeignKeyAction::Cascade),
        )
}

fn comments() -> TableDef {
    TableDef::new("comments")
        .column(
            ColumnDef::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnDef::new("post_id", SqlType::BigInt).not_null())
        .column(ColumnDef::new("author_id", SqlType::BigInt))
        .column(ColumnDef::new("body", SqlType::Text).not_null())
        .foreign_key(
            ForeignKeyDef::new("post_id", "posts", "id").on_delete(ForeignKeyAction::Cascade),
        )
        .foreign_key(
            ForeignKeyDef::new("author_id", "users", "id").on_delete(ForeignKeyAction::SetNull),
        )
}

fn tags() -> TableDef {
    TableDef::new("tags")
        .column(ColumnDef::new("id", SqlType::BigInt).primary_key())
        .column(ColumnDef::new("name", SqlType::Varchar(50)).not_null())
}

fn versions() -> Vec<(&'static str, SchemaSnapshot)> {
    let v1 = SchemaSnapshot::new().table(users());
    let v2 = v1.clone().table(posts()).table(comments());
    let v3 = v2
        .clone()
        .table(
            posts()
                .column(
                    ColumnDef::new("is_published", SqlType::Boolean)
                        .not_null()
                        .default(DefaultValue::Bool(false)),
                )
                .index(IndexDef::new("idx_posts_author", ["author_id"])),
        )
        .table(tags());

    vec![
        ("create_users", v1),
        ("create_posts_and_comments", v2),
        ("add_tags", v3),
    ]
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" Blog Schema Evolution Example");
    println!("{}", "=".repeat(70));
    println!();

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    let executor = MigrationExecutor::new(pool, SqliteDialect::new());
    let cancel = CancellationToken::new();

    let mut store = MemoryStateStore::new();

    for (name, schema) in versions() {
        let planner = MigrationPlanner::new(name);
        let plan = match create_migration(&mut store, &schema, &planner)? {
            PlanOutcome::Planned(plan) => plan,
            PlanOutcome::NoChanges => continue,
        };
        let artifact = &plan.artifact;

        println!("[{}] {}", artifact.revision, artifact.file_stem());
        println!("    up:");
        for line in &artifact.up_log {
            println!("      {}", line);
        }
        println!("    down:");
        for line in &artifact.down_log {
            println!("      {}", line);
        }

        let applied = executor.apply(&artifact.up, &cancel).await?;
        println!("    applied {} action(s)", applied);
        println!();
    }

    // Planning against the committed schema finds nothing new
    let (_, latest) = versions().remove(2);
    let outcome = create_migration(&mut store, &latest, &MigrationPlanner::new("noop"))?;
    println!(
        "Re-planning the latest schema: {:?}",
        outcome.plan().map(|p| p.artifact.revision)
    );
    println!();

    // Roll back the last migration
    let last = store
        .artifacts()
        .last()
        .ok_or("no migrations were committed")?
        .clone();
    println!("Rolling back {}:", last.file_stem());
    for sql in executor.sql_for(&last.down) {
        println!("    {};", sql);
    }
    executor.apply(&last.down, &cancel).await?;
    println!();

    println!("{}", "=".repeat(70));
    println!(" Example completed successfully!");
    println!("{}", "=".repeat(70));

    Ok(())
}
