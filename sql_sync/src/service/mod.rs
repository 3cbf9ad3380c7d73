//! Per-connection operations
//!
//! Each operation opens one transaction on one connection, never lets an
//! error escape past its [`OperationResult`], and reports its lifecycle to the
//! configured [`SyncObserver`].

pub mod execution;
pub mod injection;
pub mod manual;
pub mod migrate;
pub mod observer;
pub mod result;
pub mod sync;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::connection::{ConnectionDescriptor, ConnectionTarget, DatabaseConnection};
use crate::db::executor::SyncTransaction;
use crate::error::Result;
use crate::migration::MigrationLoader;

pub use execution::{execute_processes, ExecutionStrategy};
pub use observer::{NoopObserver, SyncObserver};
pub use result::{OperationResult, OperationTimer, ResultSummary};

/// Shared, read-only state of one invocation
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub config: &'a Config,
    pub observer: &'a dyn SyncObserver,
    pub migration_loader: Option<&'a dyn MigrationLoader>,
}

impl<'a> SyncContext<'a> {
    pub fn new(config: &'a Config, observer: &'a dyn SyncObserver) -> Self {
        Self {
            config,
            observer,
            migration_loader: None,
        }
    }

    pub fn with_migration_loader(mut self, loader: &'a dyn MigrationLoader) -> Self {
        self.migration_loader = Some(loader);
        self
    }
}

/// Commit or roll back depending on the outcome and on `dry_run`
pub(crate) async fn finish_transaction<T>(
    tx: SyncTransaction,
    outcome: Result<T>,
    dry_run: bool,
    connection_id: &str,
) -> Result<T> {
    match outcome {
        Ok(value) if dry_run => {
            tx.rollback().await?;
            info!(connection = connection_id, "Dry run, changes rolled back");
            Ok(value)
        }
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = tx.rollback().await {
                warn!(connection = connection_id, error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Close pools this crate opened; live pools belong to the caller
pub(crate) async fn release(connection: &ConnectionDescriptor, db: &DatabaseConnection) {
    if let ConnectionTarget::Params(_) = connection.target {
        db.close().await;
    }
}

/// Build the final result of an operation and notify the observer
pub(crate) fn complete<T>(
    ctx: &SyncContext<'_>,
    connection_id: &str,
    timer: &OperationTimer,
    outcome: Result<T>,
) -> OperationResult<T> {
    let result = OperationResult::from_outcome(connection_id, timer, outcome);

    match &result.error {
        None => {
            info!(connection = connection_id, elapsed = result.time_elapsed, "Completed");
            ctx.observer.on_success(connection_id, result.time_elapsed);
        }
        Some(e) => {
            error!(connection = connection_id, error = %e, "Failed");
            ctx.observer.on_failed(connection_id, e);
        }
    }

    result
}
