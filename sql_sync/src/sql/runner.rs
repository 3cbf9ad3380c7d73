//! SQL runner
//!
//! Executes source code in order and tears objects down in reverse order.
//! Statements are awaited one at a time; a transaction only ever has a single
//! statement in flight.

use tracing::{debug, info};

use crate::db::executor::SqlExecutor;
use crate::error::Result;
use crate::sql::types::{ObjectType, SqlCode, SqlFileInfo};

/// Execute every unit in the given order, skipping drop-only units
pub async fn run_sequentially(
    tx: &mut dyn SqlExecutor,
    units: &[SqlCode],
    connection_id: &str,
) -> Result<()> {
    for unit in units {
        if unit.drop_only {
            info!(connection = connection_id, file = %unit.name, "Skipping drop-only object");
            continue;
        }

        debug!(connection = connection_id, file = %unit.name, "Running SQL file");
        tx.execute(&unit.sql).await?;
    }

    Ok(())
}

/// `DROP` statement for an object descriptor
pub fn drop_statement(info: &SqlFileInfo) -> String {
    drop_statement_for(info.object_type, &info.fqon)
}

/// `DROP` statement for an object type given by name.
///
/// Fails when no drop keyword is registered for `object_type`.
pub fn get_drop_statement(object_type: &str, fqon: &str) -> Result<String> {
    let object_type: ObjectType = object_type.parse()?;
    Ok(drop_statement_for(object_type, fqon))
}

fn drop_statement_for(object_type: ObjectType, fqon: &str) -> String {
    format!("DROP {} IF EXISTS {}", object_type.drop_keyword(), fqon)
}

/// Drop every described object, last created first
pub async fn rollback_sequentially(
    tx: &mut dyn SqlExecutor,
    descriptors: &[SqlFileInfo],
    connection_id: &str,
) -> Result<()> {
    for info in descriptors.iter().rev() {
        let statement = drop_statement(info);
        debug!(connection = connection_id, sql = %statement, "Dropping object");
        tx.execute(&statement).await?;
    }

    Ok(())
}
