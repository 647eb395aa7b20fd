//! Migration artifacts and the files they are written to.
//!
//! A [`MigrationArtifact`] is the durable record of one planned migration:
//! the ordered up and down action sequences plus their log lines. Once
//! written it is never modified.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::Action;
use crate::error::{MigrateError, Result};

/// Which half of a migration to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the current schema.
    Up,
    /// Back toward the previous schema.
    Down,
}

/// A planned, reversible migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationArtifact {
    /// Revision the schema is at after applying `up`.
    pub revision: u64,
    /// Short free-text name.
    pub name: String,
    /// Longer free-text description.
    #[serde(default)]
    pub comment: String,
    /// When the migration was planned.
    pub created_at: DateTime<Utc>,
    /// Ordered actions from the previous schema to the current one.
    pub up: Vec<Action>,
    /// Ordered actions from the current schema back to the previous one.
    pub down: Vec<Action>,
    /// One log line per `up` action.
    pub up_log: Vec<String>,
    /// One log line per `down` action.
    pub down_log: Vec<String>,
}

impl MigrationArtifact {
    /// Returns the actions for the given direction.
    #[must_use]
    pub fn actions(&self, direction: Direction) -> &[Action] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// Base file name (without extension), e.g. `0003-add_email`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        generate_migration_name(self.revision, &self.name)
    }
}

/// Generates a migration file stem: zero-padded revision and a slug of the
/// name.
#[must_use]
pub fn generate_migration_name(revision: u64, name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let slug = if slug.is_empty() {
        "noname".to_string()
    } else {
        slug
    };
    format!("{:04}-{}", revision, slug)
}

/// Parses the revision prefix of an artifact file name.
fn revision_of(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".json")?;
    let (prefix, _) = stem.split_once('-')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

pub(crate) fn persistence(path: &Path) -> impl FnOnce(std::io::Error) -> MigrateError + '_ {
    move |source| MigrateError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

/// An artifact written to a temporary file, not yet visible under its
/// final name.
#[derive(Debug)]
pub struct StagedArtifact {
    staged: PathBuf,
    target: PathBuf,
}

impl StagedArtifact {
    /// Final path of the artifact.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Moves the artifact to its final name. The staged file is removed if
    /// the move fails.
    pub fn publish(self) -> Result<PathBuf> {
        if let Err(e) = fs::rename(&self.staged, &self.target) {
            let target = self.target.clone();
            self.discard();
            return Err(persistence(&target)(e));
        }
        Ok(self.target)
    }

    /// Removes the staged file.
    pub fn discard(self) {
        if let Err(e) = fs::remove_file(&self.staged) {
            debug!(path = %self.staged.display(), error = %e, "Failed to remove staged artifact");
        }
    }
}

/// Writes and reads migration artifacts in a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    dir: PathBuf,
}

impl MigrationWriter {
    /// Creates a writer for the given migrations directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The migrations directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an artifact is written to.
    #[must_use]
    pub fn path_for(&self, artifact: &MigrationArtifact) -> PathBuf {
        self.dir.join(format!("{}.json", artifact.file_stem()))
    }

    /// Writes the artifact to a temporary file next to its final path.
    ///
    /// Fails with [`MigrateError::MigrationExists`] if the final path is
    /// already taken.
    pub fn stage(&self, artifact: &MigrationArtifact) -> Result<StagedArtifact> {
        let target = self.path_for(artifact);
        if target.exists() {
            return Err(MigrateError::MigrationExists(target));
        }

        let staged = target.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(artifact)?;
        fs::write(&staged, json).map_err(persistence(&staged))?;

        Ok(StagedArtifact { staged, target })
    }

    /// Writes the artifact and returns its path.
    pub fn write(&self, artifact: &MigrationArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(persistence(&self.dir))?;
        self.stage(artifact)?.publish()
    }

    /// Reads an artifact file.
    pub fn read(&self, path: &Path) -> Result<MigrationArtifact> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Lists artifact files, ordered by revision.
    pub fn list(&self) -> Result<Vec<(u64, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let revision = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(revision_of);
            if let Some(revision) = revision {
                found.push((revision, path));
            }
        }
        found.sort();
        Ok(found)
    }

    /// Reads the artifact for a revision.
    pub fn find(&self, revision: u64) -> Result<MigrationArtifact> {
        let (_, path) = self
            .list()?
            .into_iter()
            .find(|(r, _)| *r == revision)
            .ok_or(MigrateError::MigrationNotFound(revision))?;
        self.read(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, SqlType};
    use tempfile::TempDir;

    fn artifact(revision: u64, name: &str) -> MigrationArtifact {
        let add = Action::AddColumn {
            table: "users".to_string(),
            column: ColumnDef::new("email", SqlType::Text),
        };
        let remove = add.invert();
        MigrationArtifact {
            revision,
            name: name.to_string(),
            comment: String::new(),
            created_at: Utc::now(),
            up_log: vec![add.log_line()],
            down_log: vec![remove.log_line()],
            up: vec![add],
            down: vec![remove],
        }
    }

    #[test]
    fn test_generate_migration_name() {
        assert_eq!(generate_migration_name(1, "initial"), "0001-initial");
        assert_eq!(generate_migration_name(42, "Add Email!"), "0042-add_email_");
        assert_eq!(generate_migration_name(12345, ""), "12345-noname");
    }

    #[test]
    fn test_revision_of() {
        assert_eq!(revision_of("0007-add_email.json"), Some(7));
        assert_eq!(revision_of("_current.json"), None);
        assert_eq!(revision_of("0007-add_email.json.tmp"), None);
        assert_eq!(revision_of("notes.txt"), None);
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let writer = MigrationWriter::new(dir.path());
        let original = artifact(1, "add email");

        let path = writer.write(&original).unwrap();
        assert!(path.ends_with("0001-add_email.json"));
        assert_eq!(writer.read(&path).unwrap(), original);
        assert_eq!(writer.find(1).unwrap(), original);
    }

    #[test]
    fn test_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let writer = MigrationWriter::new(dir.path());

        writer.write(&artifact(1, "first")).unwrap();
        let result = writer.write(&artifact(1, "first"));
        assert!(matches!(result, Err(MigrateError::MigrationExists(_))));
    }

    #[test]
    fn test_list_sorted_by_revision() {
        let dir = TempDir::new().unwrap();
        let writer = MigrationWriter::new(dir.path());

        writer.write(&artifact(2, "second")).unwrap();
        writer.write(&artifact(1, "first")).unwrap();
        fs::write(dir.path().join("_current.json"), "{}").unwrap();

        let revisions: Vec<u64> = writer.list().unwrap().into_iter().map(|(r, _)| r).collect();
        assert_eq!(revisions, vec![1, 2]);
        assert!(matches!(writer.find(3), Err(MigrateError::MigrationNotFound(3))));
    }

    #[test]
    fn test_discard_staged() {
        let dir = TempDir::new().unwrap();
        let writer = MigrationWriter::new(dir.path());

        let staged = writer.stage(&artifact(1, "first")).unwrap();
        let target = staged.target().to_path_buf();
        staged.discard();

        assert!(!target.exists());
        assert!(writer.list().unwrap().is_empty());
    }

    #[test]
    fn test_actions_by_direction() {
        let a = artifact(1, "x");
        assert_eq!(a.actions(Direction::Up), a.up.as_slice());
        assert_eq!(a.actions(Direction::Down), a.down.as_slice());
    }
}
