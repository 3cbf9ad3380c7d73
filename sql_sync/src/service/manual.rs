//! Manual scripts
//!
//! One-off scripts that are not declarative objects. Every executed script is
//! logged by name in a `(id, name, run_time)` table, and logged scripts are
//! never run again on that connection.

use std::collections::HashSet;
use std::path::Path;
use tracing::{info, info_span, Instrument};

use crate::config::Config;
use crate::db::connection::ConnectionDescriptor;
use crate::db::executor::SqlExecutor;
use crate::error::{Error, Result};
use crate::service::result::{OperationResult, OperationTimer};
use crate::service::{complete, finish_transaction, release, SyncContext};
use crate::sql::loader::resolve_files;
use crate::sql::types::SqlCode;

/// Options of a manual script run
#[derive(Debug, Clone, Default)]
pub struct RunScriptParams {
    pub dry_run: bool,
}

/// Names of the manual scripts, relative to the manual directory and sorted
pub fn list_manual_scripts(directory: &Path) -> Result<Vec<String>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        "{}/**/*.sql",
        glob::Pattern::escape(&directory.to_string_lossy())
    );
    let paths = glob::glob(&pattern).map_err(|e| Error::ConfigError(e.to_string()))?;

    let mut names = Vec::new();
    for path in paths {
        let path = path.map_err(|e| Error::IoError(e.into()))?;
        let relative = path
            .strip_prefix(directory)
            .map_err(|e| Error::Unknown(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        names.push(relative);
    }

    names.sort();
    Ok(names)
}

/// Ensure the script log table exists
pub async fn ensure_log_table(tx: &mut dyn SqlExecutor, table_name: &str) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            {},
            name VARCHAR(255) NOT NULL,
            run_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        table_name,
        tx.driver().auto_increment_primary_key()
    );
    tx.execute(&sql).await?;
    Ok(())
}

/// Run every script not yet logged, returning the names that ran
pub async fn run_script_with_log(
    tx: &mut dyn SqlExecutor,
    scripts: &[SqlCode],
    table_name: &str,
    connection_id: &str,
) -> Result<Vec<String>> {
    ensure_log_table(tx, table_name).await?;

    let logged: HashSet<String> = tx
        .fetch_strings(&format!("SELECT name FROM {}", table_name))
        .await?
        .into_iter()
        .collect();

    let mut executed = Vec::new();
    for script in scripts.iter().filter(|s| !logged.contains(&s.name)) {
        info!(connection = connection_id, script = %script.name, "Running manual script");
        tx.execute(&script.sql).await?;

        let insert = format!(
            "INSERT INTO {} (name) VALUES ({})",
            table_name,
            tx.driver().quote_literal(&script.name)
        );
        tx.execute(&insert).await?;
        executed.push(script.name.clone());
    }

    if executed.is_empty() {
        info!(connection = connection_id, "No new manual scripts to run");
    }

    Ok(executed)
}

/// Load every script of the manual directory
pub async fn load_manual_scripts(config: &Config) -> Result<Vec<SqlCode>> {
    let directory = config.manual_path();
    let names = list_manual_scripts(&directory)?;
    resolve_files(&directory, &names).await
}

/// Run pending manual scripts on one connection
pub async fn run_scripts(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &RunScriptParams,
) -> OperationResult<Vec<String>> {
    let span = info_span!("run_scripts", connection = %connection.id);

    async {
        let timer = OperationTimer::start();
        ctx.observer.on_started(&connection.id);

        let outcome = async {
            let scripts = load_manual_scripts(ctx.config).await?;
            let db = connection.connect().await?;

            let result = async {
                let mut tx = db.begin().await?;
                let outcome = run_script_with_log(
                    &mut tx,
                    &scripts,
                    &ctx.config.manual.table_name,
                    &connection.id,
                )
                .await;
                finish_transaction(tx, outcome, params.dry_run, &connection.id).await
            }
            .await;
            release(connection, &db).await;
            result
        }
        .await;

        complete(ctx, &connection.id, &timer, outcome)
    }
    .instrument(span)
    .await
}
