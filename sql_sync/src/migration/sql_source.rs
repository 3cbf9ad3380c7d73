//! SQL file migration source
//!
//! Each migration is a `<name>.up.sql` / `<name>.down.sql` pair. Either side
//! may be missing, in which case that direction has nothing to run.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::migration::{MigrationAction, MigrationEntry};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

#[derive(Debug, Clone, Default)]
struct SqlMigrationFiles {
    up: Option<String>,
    down: Option<String>,
}

/// Migrations read from a directory of SQL files
#[derive(Debug, Clone, Default)]
pub struct SqlMigrationSource {
    migrations: BTreeMap<String, SqlMigrationFiles>,
}

impl SqlMigrationSource {
    /// Read every migration file of `directory`.
    ///
    /// A missing directory yields an empty source.
    pub async fn load(directory: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(directory).await? {
            debug!(directory = %directory.display(), "Migration directory not found");
            return Ok(Self::default());
        }

        let mut files: Vec<(String, bool, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();

            if let Some(name) = file_name.strip_suffix(UP_SUFFIX) {
                files.push((name.to_string(), true, entry.path()));
            } else if let Some(name) = file_name.strip_suffix(DOWN_SUFFIX) {
                files.push((name.to_string(), false, entry.path()));
            }
        }

        let contents = try_join_all(files.iter().map(|(_, _, path)| async move {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| Error::FileReadError {
                    path: path.clone(),
                    source,
                })
        }))
        .await?;

        let mut migrations: BTreeMap<String, SqlMigrationFiles> = BTreeMap::new();
        for ((name, is_up, _), sql) in files.into_iter().zip(contents) {
            let entry = migrations.entry(name).or_default();
            if is_up {
                entry.up = Some(sql);
            } else {
                entry.down = Some(sql);
            }
        }

        Ok(Self { migrations })
    }

    /// Build a source from in-memory `(name, up, down)` triples
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>, Option<String>)>,
    {
        let migrations = entries
            .into_iter()
            .map(|(name, up, down)| (name, SqlMigrationFiles { up, down }))
            .collect();
        Self { migrations }
    }

    /// Migration names, sorted
    pub fn keys(&self) -> Vec<String> {
        self.migrations.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<MigrationEntry> {
        let files = self
            .migrations
            .get(name)
            .ok_or_else(|| Error::MigrationNotFound(name.to_string()))?;

        Ok(MigrationEntry {
            name: name.to_string(),
            up: to_action(&files.up),
            down: to_action(&files.down),
        })
    }
}

fn to_action(sql: &Option<String>) -> MigrationAction {
    match sql {
        Some(sql) => MigrationAction::Sql(sql.clone()),
        None => MigrationAction::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[tokio::test]
    async fn test_load_pairs_and_sorts_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0002_add_index.up.sql"), "CREATE INDEX ix ON t (a);").unwrap();
        fs::write(dir.path().join("0001_create_t.up.sql"), "CREATE TABLE t (a INT);").unwrap();
        fs::write(dir.path().join("0001_create_t.down.sql"), "DROP TABLE t;").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = SqlMigrationSource::load(dir.path()).await.unwrap();

        assert_eq!(source.keys(), vec!["0001_create_t", "0002_add_index"]);

        let first = source.get("0001_create_t").unwrap();
        assert!(matches!(first.up, MigrationAction::Sql(ref sql) if sql == "CREATE TABLE t (a INT);"));
        assert!(matches!(first.down, MigrationAction::Sql(ref sql) if sql == "DROP TABLE t;"));

        let second = source.get("0002_add_index").unwrap();
        assert!(matches!(second.down, MigrationAction::Noop));
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();

        let source = SqlMigrationSource::load(&dir.path().join("migration")).await.unwrap();

        assert!(source.keys().is_empty());
    }

    #[test]
    fn test_unknown_migration() {
        let source = SqlMigrationSource::from_entries(vec![(
            "0001_init".to_string(),
            Some("SELECT 1".to_string()),
            None,
        )]);

        assert!(matches!(
            source.get("0002_missing"),
            Err(Error::MigrationNotFound(ref name)) if name == "0002_missing"
        ));
    }
}
