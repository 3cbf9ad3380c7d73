//! Migration management
//!
//! This module runs migrations from a [`BoundMigrationSource`] and tracks the
//! applied ones in a history table of `(id, name, batch, migration_time)` rows.
//! Migrations applied by one call share a batch number; rollback undoes the
//! most recent batch.

use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::db::executor::SqlExecutor;
use crate::error::{Error, Result};
use crate::migration::{BoundMigrationSource, Direction};

/// Whether a migration has been applied on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub applied: bool,
}

/// Ensure the migration history table exists
pub async fn ensure_migration_table(tx: &mut dyn SqlExecutor, table_name: &str) -> Result<()> {
    let create_table_sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            {},
            name VARCHAR(255) NOT NULL,
            batch BIGINT NOT NULL,
            migration_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        table_name,
        tx.driver().auto_increment_primary_key()
    );

    tx.execute(&create_table_sql).await?;
    Ok(())
}

/// Names of applied migrations, in application order
pub async fn completed_migrations(tx: &mut dyn SqlExecutor, table_name: &str) -> Result<Vec<String>> {
    let sql = format!("SELECT name FROM {} ORDER BY id", table_name);
    tx.fetch_strings(&sql).await
}

/// Apply every migration not yet recorded, returning the applied names
pub async fn apply_pending(
    tx: &mut dyn SqlExecutor,
    source: &BoundMigrationSource<'_>,
    table_name: &str,
) -> Result<Vec<String>> {
    ensure_migration_table(tx, table_name).await?;

    let completed: HashSet<String> = completed_migrations(tx, table_name).await?.into_iter().collect();
    let pending: Vec<String> = source
        .keys()
        .into_iter()
        .filter(|name| !completed.contains(name))
        .collect();

    if pending.is_empty() {
        info!(connection = source.connection_id(), "Already up to date");
        return Ok(Vec::new());
    }

    let batch = last_batch(tx, table_name).await? + 1;

    for name in &pending {
        let entry = source.get(name)?;
        let ran = entry
            .action(Direction::Up)
            .run(tx)
            .await
            .map_err(|e| Error::MigrationError(format!("{} (up): {}", name, e)))?;

        if !ran {
            info!(connection = source.connection_id(), migration = %name, "Nothing to run");
        }

        record_migration(tx, table_name, name, batch).await?;
        info!(connection = source.connection_id(), migration = %name, batch, "Migration applied");
    }

    Ok(pending)
}

/// Undo the most recent batch, returning the rolled back names
pub async fn rollback_batch(
    tx: &mut dyn SqlExecutor,
    source: &BoundMigrationSource<'_>,
    table_name: &str,
) -> Result<Vec<String>> {
    ensure_migration_table(tx, table_name).await?;

    let batch = last_batch(tx, table_name).await?;
    if batch == 0 {
        info!(connection = source.connection_id(), "No migrations to roll back");
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT name FROM {} WHERE batch = {} ORDER BY id DESC",
        table_name, batch
    );
    let names = tx.fetch_strings(&sql).await?;

    for name in &names {
        let entry = source.get(name)?;
        entry
            .action(Direction::Down)
            .run(tx)
            .await
            .map_err(|e| Error::MigrationError(format!("{} (down): {}", name, e)))?;

        let delete_sql = format!(
            "DELETE FROM {} WHERE name = {}",
            table_name,
            tx.driver().quote_literal(name)
        );
        tx.execute(&delete_sql).await?;
        info!(connection = source.connection_id(), migration = %name, batch, "Migration rolled back");
    }

    Ok(names)
}

/// Status of every known migration, including recorded ones missing from the source
pub async fn list(
    tx: &mut dyn SqlExecutor,
    source: &BoundMigrationSource<'_>,
    table_name: &str,
) -> Result<Vec<MigrationStatus>> {
    ensure_migration_table(tx, table_name).await?;

    let completed = completed_migrations(tx, table_name).await?;
    let completed_set: HashSet<&String> = completed.iter().collect();
    let keys = source.keys();
    let known: HashSet<&String> = keys.iter().collect();

    let mut statuses: Vec<MigrationStatus> = completed
        .iter()
        .filter(|name| !known.contains(name))
        .map(|name| MigrationStatus {
            name: name.clone(),
            applied: true,
        })
        .collect();

    statuses.extend(keys.iter().map(|name| MigrationStatus {
        name: name.clone(),
        applied: completed_set.contains(name),
    }));

    Ok(statuses)
}

async fn last_batch(tx: &mut dyn SqlExecutor, table_name: &str) -> Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(batch), 0) FROM {}", table_name);
    tx.fetch_i64(&sql).await
}

/// Record a migration in the history table
async fn record_migration(
    tx: &mut dyn SqlExecutor,
    table_name: &str,
    name: &str,
    batch: i64,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (name, batch) VALUES ({}, {})",
        table_name,
        tx.driver().quote_literal(name),
        batch
    );

    tx.execute(&sql).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::testing::RecordingExecutor;
    use crate::migration::{MigrationSource, SqlMigrationSource};

    #[tokio::test]
    async fn test_apply_pending_records_each_migration() {
        let source = MigrationSource::Sql(SqlMigrationSource::from_entries(vec![
            ("0001_a".to_string(), Some("CREATE TABLE a (x INT)".to_string()), None),
            ("0002_b".to_string(), None, Some("DROP TABLE b".to_string())),
        ]));
        let mut tx = RecordingExecutor::new();

        let applied = apply_pending(&mut tx, &source.bind("test"), "history").await.unwrap();

        assert_eq!(applied, vec!["0001_a", "0002_b"]);
        assert!(tx.statements[0].starts_with("CREATE TABLE IF NOT EXISTS history"));
        assert!(tx.statements.contains(&"CREATE TABLE a (x INT)".to_string()));
        assert!(tx
            .statements
            .contains(&"INSERT INTO history (name, batch) VALUES ('0002_b', 1)".to_string()));
    }

    #[tokio::test]
    async fn test_failed_migration_names_the_migration() {
        let source = MigrationSource::Sql(SqlMigrationSource::from_entries(vec![(
            "0001_broken".to_string(),
            Some("CREATE TABLE broken".to_string()),
            None,
        )]));
        let mut tx = RecordingExecutor::failing_on("broken");

        let err = apply_pending(&mut tx, &source.bind("test"), "history").await.unwrap_err();

        assert!(err.to_string().contains("0001_broken (up)"));
    }
}
