//! Persisted schema state.
//!
//! A state store owns the last committed [`SchemaSnapshot`] and a
//! single-slot backup of the one before it. Committing a migration replaces
//! the snapshot and records the artifact as one unit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::artifact::{persistence, MigrationArtifact, MigrationWriter, StagedArtifact};
use crate::error::{MigrateError, Result};
use crate::schema::SchemaSnapshot;

/// File holding the committed snapshot.
pub const CURRENT_FILE: &str = "_current.json";
/// File holding the snapshot replaced by the last commit.
pub const BACKUP_FILE: &str = "_current_bak.json";

/// Storage for the committed schema snapshot.
///
/// Stores are not locked. Only one writer may plan and save against a
/// store at a time.
pub trait StateStore {
    /// Loads the committed snapshot.
    ///
    /// Missing or unreadable state yields the empty snapshot at revision 0.
    fn load(&self) -> SchemaSnapshot;

    /// Commits `next` together with the artifact that leads to it.
    fn save(&mut self, next: &SchemaSnapshot, artifact: &MigrationArtifact) -> Result<()>;
}

fn check_revisions(next: &SchemaSnapshot, artifact: &MigrationArtifact) -> Result<()> {
    if next.revision != artifact.revision {
        return Err(MigrateError::InvalidState(format!(
            "Snapshot revision {} does not match migration revision {}",
            next.revision, artifact.revision
        )));
    }
    Ok(())
}

/// In-memory state store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    current: Option<SchemaSnapshot>,
    backup: Option<SchemaSnapshot>,
    artifacts: Vec<MigrationArtifact>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose committed snapshot is `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: SchemaSnapshot) -> Self {
        Self {
            current: Some(snapshot),
            ..Self::default()
        }
    }

    /// The snapshot replaced by the last commit.
    #[must_use]
    pub fn backup(&self) -> Option<&SchemaSnapshot> {
        self.backup.as_ref()
    }

    /// Committed artifacts, oldest first.
    #[must_use]
    pub fn artifacts(&self) -> &[MigrationArtifact] {
        &self.artifacts
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> SchemaSnapshot {
        self.current.clone().unwrap_or_default()
    }

    fn save(&mut self, next: &SchemaSnapshot, artifact: &MigrationArtifact) -> Result<()> {
        check_revisions(next, artifact)?;
        self.backup = self.current.replace(next.clone());
        self.artifacts.push(artifact.clone());
        Ok(())
    }
}

/// Directory-backed state store.
///
/// The directory holds [`CURRENT_FILE`], [`BACKUP_FILE`] and one
/// `<revision>-<name>.json` file per migration.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
    writer: MigrationWriter,
}

impl FileStateStore {
    /// Creates a store for the given migrations directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            writer: MigrationWriter::new(&dir),
            dir,
        }
    }

    /// The migrations directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writer for the artifacts in this store.
    #[must_use]
    pub fn writer(&self) -> &MigrationWriter {
        &self.writer
    }

    /// Path of the committed snapshot.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    /// Path of the backup snapshot.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(BACKUP_FILE)
    }

    /// Loads the committed snapshot, distinguishing "none" from "unreadable".
    pub fn try_load(&self) -> Result<Option<SchemaSnapshot>> {
        read_snapshot(&self.current_path())
    }

    /// Loads the backup snapshot.
    pub fn load_backup(&self) -> Result<Option<SchemaSnapshot>> {
        read_snapshot(&self.backup_path())
    }

    /// Rotates the backup, swaps in `next` and publishes the staged
    /// artifact. On failure the snapshot and backup files are put back the
    /// way they were found.
    fn commit(&self, staged: StagedArtifact, next: &SchemaSnapshot) -> Result<()> {
        let previous = match PreviousFiles::capture(self) {
            Ok(previous) => previous,
            Err(e) => {
                staged.discard();
                return Err(e);
            }
        };

        if let Err(e) = self.swap(&previous, next) {
            staged.discard();
            previous.restore(self);
            return Err(e);
        }

        match staged.publish() {
            Ok(path) => {
                debug!(path = %path.display(), revision = next.revision, "Committed migration");
                Ok(())
            }
            Err(e) => {
                previous.restore(self);
                Err(e)
            }
        }
    }

    fn swap(&self, previous: &PreviousFiles, next: &SchemaSnapshot) -> Result<()> {
        if let Some(bytes) = &previous.current {
            let backup = self.backup_path();
            write_atomic(&backup, bytes)?;
            debug!(path = %backup.display(), "Backed up previous state");
        }
        let json = serde_json::to_string_pretty(next)?;
        write_atomic(&self.current_path(), json.as_bytes())
    }
}

/// Contents of the snapshot and backup files before a save touches them.
struct PreviousFiles {
    current: Option<Vec<u8>>,
    backup: Option<Vec<u8>>,
}

impl PreviousFiles {
    fn capture(store: &FileStateStore) -> Result<Self> {
        Ok(Self {
            current: read_optional(&store.current_path())?,
            backup: read_optional(&store.backup_path())?,
        })
    }

    fn restore(&self, store: &FileStateStore) {
        for (path, contents) in [
            (store.current_path(), &self.current),
            (store.backup_path(), &self.backup),
        ] {
            let result = match contents {
                Some(bytes) => fs::write(&path, bytes),
                None => match fs::remove_file(&path) {
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "Failed to restore state after failed save");
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(persistence(path)(e)),
    }
}

/// Writes `contents` next to `path` and renames it into place.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let staged = path.with_extension("json.tmp");
    fs::write(&staged, contents).map_err(persistence(&staged))?;
    if let Err(e) = fs::rename(&staged, path) {
        remove_quietly(&staged);
        return Err(persistence(path)(e));
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<Option<SchemaSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Failed to remove temporary file");
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> SchemaSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No previous state found, starting from revision 0");
                SchemaSnapshot::new()
            }
            Err(e) => {
                warn!(path = %self.current_path().display(), error = %e, "Unreadable state, starting from revision 0");
                SchemaSnapshot::new()
            }
        }
    }

    fn save(&mut self, next: &SchemaSnapshot, artifact: &MigrationArtifact) -> Result<()> {
        check_revisions(next, artifact)?;
        fs::create_dir_all(&self.dir).map_err(persistence(&self.dir))?;

        let staged = self.writer.stage(artifact)?;
        self.commit(staged, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{MigrationPlanner, Plan, PlanOutcome};
    use crate::schema::{ColumnDef, SqlType, TableDef};
    use tempfile::TempDir;

    fn schema(columns: &[&str]) -> SchemaSnapshot {
        let table = columns.iter().fold(TableDef::new("users"), |t, c| {
            t.column(ColumnDef::new(*c, SqlType::Text))
        });
        SchemaSnapshot::new().table(table)
    }

    fn commit(store: &mut impl StateStore, current: &SchemaSnapshot, name: &str) -> u64 {
        let previous = store.load();
        match MigrationPlanner::new(name).plan(&previous, current).unwrap() {
            PlanOutcome::Planned(plan) => {
                store.save(&plan.snapshot, &plan.artifact).unwrap();
                plan.artifact.revision
            }
            PlanOutcome::NoChanges => panic!("Expected changes"),
        }
    }

    #[test]
    fn test_missing_state_is_revision_zero() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("migrations"));
        assert_eq!(store.load(), SchemaSnapshot::new());
        assert!(store.try_load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_state_is_revision_zero() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        fs::write(store.current_path(), "{ not json").unwrap();

        assert!(store.try_load().is_err());
        assert_eq!(store.load(), SchemaSnapshot::new());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path().join("migrations"));

        let current = schema(&["id"]);
        let revision = commit(&mut store, &current, "initial");

        let loaded = store.load();
        assert_eq!(revision, 1);
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.tables, current.tables);
        assert!(store.dir().join("0001-initial.json").exists());
        assert!(store.load_backup().unwrap().is_none());
    }

    #[test]
    fn test_backup_holds_previous_snapshot_only() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());

        commit(&mut store, &schema(&["id"]), "one");
        commit(&mut store, &schema(&["id", "name"]), "two");
        commit(&mut store, &schema(&["id", "name", "email"]), "three");

        let backup = store.load_backup().unwrap().unwrap();
        assert_eq!(backup.revision, 2);
        assert_eq!(backup.tables, schema(&["id", "name"]).tables);
        assert_eq!(store.load().revision, 3);
    }

    #[test]
    fn test_revisions_increase_by_one() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());

        let mut columns = vec!["id"];
        let names = ["a", "b", "c", "d"];
        for (i, name) in names.iter().enumerate() {
            columns.push(*name);
            let revision = commit(&mut store, &schema(&columns), name);
            assert_eq!(revision, i as u64 + 1);
        }

        let revisions: Vec<u64> = store
            .writer()
            .list()
            .unwrap()
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        assert_eq!(revisions, vec![1, 2, 3, 4]);
    }

    fn plan_next(store: &impl StateStore, current: &SchemaSnapshot, name: &str) -> Plan {
        match MigrationPlanner::new(name)
            .plan(&store.load(), current)
            .unwrap()
        {
            PlanOutcome::Planned(plan) => plan,
            PlanOutcome::NoChanges => panic!("Expected changes"),
        }
    }

    fn files(store: &FileStateStore) -> (Vec<u8>, Vec<u8>, Vec<(u64, PathBuf)>) {
        (
            fs::read(store.current_path()).unwrap(),
            fs::read(store.backup_path()).unwrap(),
            store.writer().list().unwrap(),
        )
    }

    #[test]
    fn test_failed_snapshot_write_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        commit(&mut store, &schema(&["id"]), "one");
        commit(&mut store, &schema(&["id", "name"]), "two");
        let before = files(&store);

        // A directory where the snapshot is staged makes the write fail.
        fs::create_dir(store.current_path().with_extension("json.tmp")).unwrap();
        let plan = plan_next(&store, &schema(&["id", "name", "email"]), "three");
        let result = store.save(&plan.snapshot, &plan.artifact);

        assert!(matches!(result, Err(MigrateError::Persistence { .. })));
        assert_eq!(files(&store), before);
        assert_eq!(store.load_backup().unwrap().unwrap().revision, 1);
        assert_eq!(store.load().revision, 2);
        assert!(!store.writer().path_for(&plan.artifact).exists());
        assert!(!store.backup_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_publish_restores_state() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        commit(&mut store, &schema(&["id"]), "one");
        commit(&mut store, &schema(&["id", "name"]), "two");
        let before = files(&store);

        let plan = plan_next(&store, &schema(&["id", "name", "email"]), "three");
        let staged = store.writer().stage(&plan.artifact).unwrap();
        // Losing the staged file makes the final rename fail.
        fs::remove_file(staged.target().with_extension("json.tmp")).unwrap();
        let result = store.commit(staged, &plan.snapshot);

        assert!(matches!(result, Err(MigrateError::Persistence { .. })));
        assert_eq!(files(&store), before);
        assert_eq!(store.load().revision, 2);
        assert_eq!(store.load_backup().unwrap().unwrap().revision, 1);
    }

    #[test]
    fn test_failed_save_keeps_state() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        commit(&mut store, &schema(&["id"]), "one");

        let previous = store.load();
        let plan = match MigrationPlanner::new("two")
            .plan(&previous, &schema(&["id", "name"]))
            .unwrap()
        {
            PlanOutcome::Planned(plan) => plan,
            PlanOutcome::NoChanges => panic!("Expected changes"),
        };

        // Occupy the artifact's path so staging fails.
        fs::write(store.writer().path_for(&plan.artifact), "taken").unwrap();
        let result = store.save(&plan.snapshot, &plan.artifact);
        assert!(matches!(result, Err(MigrateError::MigrationExists(_))));

        assert_eq!(store.load(), previous);
        assert!(store.load_backup().unwrap().is_none());
    }

    #[test]
    fn test_mismatched_revision_rejected() {
        let mut store = MemoryStateStore::new();
        let previous = store.load();
        let plan = match MigrationPlanner::new("x")
            .plan(&previous, &schema(&["id"]))
            .unwrap()
        {
            PlanOutcome::Planned(plan) => plan,
            PlanOutcome::NoChanges => panic!("Expected changes"),
        };

        let wrong = plan.snapshot.clone().with_revision(7);
        let result = store.save(&wrong, &plan.artifact);
        assert!(matches!(result, Err(MigrateError::InvalidState(_))));
        assert!(store.artifacts().is_empty());
    }

    #[test]
    fn test_memory_store_backup() {
        let mut store = MemoryStateStore::with_snapshot(schema(&["id"]).with_revision(5));
        let revision = commit(&mut store, &schema(&["id", "name"]), "name");

        assert_eq!(revision, 6);
        assert_eq!(store.backup().map(|s| s.revision), Some(5));
        assert_eq!(store.artifacts().len(), 1);
        assert_eq!(store.load().revision, 6);
    }
}
