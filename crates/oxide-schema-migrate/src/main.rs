//! oxide-schema-migrate CLI
//!
//! Command-line tool for planning and applying schema migrations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema_migrate::prelude::*;

/// Schema diffing and reversible migration planning.
#[derive(Parser)]
#[command(name = "oxide-schema-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a migration from the current schema and commit it.
    Create {
        /// JSON file describing the current schema.
        #[arg(short, long)]
        schema: PathBuf,

        /// Migration name.
        #[arg(short, long, default_value = "noname")]
        name: String,

        /// Migration comment.
        #[arg(short, long, default_value = "")]
        comment: String,

        /// Show the migration without writing anything.
        #[arg(long)]
        preview: bool,

        /// Apply the new migration to the database after committing it.
        #[arg(long, conflicts_with = "preview")]
        execute: bool,
    },

    /// Show the committed revision and the migration files.
    Status,

    /// Show SQL for a committed migration without executing.
    Sql {
        /// Migration revision.
        #[arg(short, long)]
        revision: u64,

        /// Show rollback SQL instead of forward SQL.
        #[arg(long)]
        down: bool,
    },
}

fn read_schema(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let schema: SchemaSnapshot = serde_json::from_str(&json)
        .with_context(|| format!("Invalid schema file {}", path.display()))?;

    for (key, table) in &schema.tables {
        if *key != table.name {
            bail!("Table '{}' is listed under the key '{}'", table.name, key);
        }
    }
    Ok(schema)
}

fn print_preview(artifact: &MigrationArtifact) {
    let dialect = SqliteDialect::new();

    println!("\nMigration {}:", artifact.file_stem());
    println!("{:-<60}", "");
    for (title, direction) in [("Up", Direction::Up), ("Down", Direction::Down)] {
        println!("{}:", title);
        for action in artifact.actions(direction) {
            println!("  {}", action);
            for sql in dialect.generate_sql(action) {
                println!("    {};", sql);
            }
        }
    }
    println!();
}

async fn execute(database: &str, actions: &[Action]) -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database)
        .await?;
    let executor = MigrationExecutor::new(pool, SqliteDialect::new());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current action");
            on_signal.cancel();
        }
    });

    let applied = executor.apply(actions, &cancel).await?;
    info!("Applied {} action(s).", applied);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut store = FileStateStore::new(&cli.migrations_dir);

    match cli.command {
        Commands::Create {
            schema,
            name,
            comment,
            preview,
            execute: run,
        } => {
            let current = read_schema(&schema)?;
            let planner = MigrationPlanner::new(name).comment(comment);

            if preview {
                let previous = store.load();
                if let PlanOutcome::Planned(plan) = planner.plan(&previous, &current)? {
                    print_preview(&plan.artifact);
                }
                return Ok(());
            }

            if let PlanOutcome::Planned(plan) = create_migration(&mut store, &current, &planner)? {
                let path = store.writer().path_for(&plan.artifact);
                info!("New migration saved to {}", path.display());

                if run {
                    execute(&cli.database, &plan.artifact.up).await?;
                }
            }
        }

        Commands::Status => {
            let snapshot = store.load();
            println!("\nRevision: {}", snapshot.revision);
            println!("Tables: {}", snapshot.tables.len());

            let migrations = store.writer().list()?;
            if migrations.is_empty() {
                info!("No migrations have been created yet.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for (revision, path) in &migrations {
                    let marker = if *revision <= snapshot.revision {
                        "X"
                    } else {
                        " "
                    };
                    println!(" [{}] {}", marker, path.display());
                }
                println!();
            }
        }

        Commands::Sql { revision, down } => {
            let artifact = store.writer().find(revision)?;
            let direction = if down { Direction::Down } else { Direction::Up };
            let dialect = SqliteDialect::new();

            for action in artifact.actions(direction) {
                for sql in dialect.generate_sql(action) {
                    println!("{};", sql);
                }
            }
        }
    }

    Ok(())
}
