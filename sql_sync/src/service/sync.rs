//! Synchronization
//!
//! One sync cycle per connection, inside a single transaction:
//!
//! 1. teardown: drop every managed object, last created first
//! 2. inject configured variables
//! 3. apply pending migrations (unless skipped)
//! 4. setup: pre-sync hooks, objects, post-sync hooks
//! 5. remove injected variables
//!
//! Any failure rolls the whole cycle back.

use tracing::{info, info_span, Instrument};

use crate::db::connection::ConnectionDescriptor;
use crate::db::executor::SqlExecutor;
use crate::db::migrations;
use crate::error::Result;
use crate::migration::MigrationSource;
use crate::service::result::{OperationResult, OperationTimer};
use crate::service::{complete, finish_transaction, injection, release, SyncContext};
use crate::sql::loader::{load_objects, load_source_tree};
use crate::sql::runner::{rollback_sequentially, run_sequentially};
use crate::sql::types::{SourceTree, SqlFileInfo};

/// Options of a synchronization
#[derive(Debug, Clone, Default)]
pub struct SynchronizeParams {
    /// Run everything, then roll back instead of committing
    pub dry_run: bool,
    pub skip_migration: bool,
}

/// Options of a prune
#[derive(Debug, Clone, Default)]
pub struct PruneParams {
    pub dry_run: bool,
}

/// Synchronize one connection
pub async fn synchronize(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &SynchronizeParams,
) -> OperationResult {
    let span = info_span!("synchronize", connection = %connection.id);

    async {
        let timer = OperationTimer::start();
        ctx.observer.on_started(&connection.id);
        info!(dry_run = params.dry_run, skip_migration = params.skip_migration, "Synchronizing");

        let outcome = run_synchronize(ctx, connection, params).await;
        complete(ctx, &connection.id, &timer, outcome)
    }
    .instrument(span)
    .await
}

async fn run_synchronize(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &SynchronizeParams,
) -> Result<()> {
    let tree = load_source_tree(ctx.config).await?;
    let migration_source = if params.skip_migration {
        None
    } else {
        Some(MigrationSource::resolve(ctx.config, ctx.migration_loader).await?)
    };

    let db = connection.connect().await?;
    let result = async {
        let mut tx = db.begin().await?;
        let outcome = sync_cycle(ctx, &mut tx, &tree, migration_source.as_ref(), &connection.id).await;
        finish_transaction(tx, outcome, params.dry_run, &connection.id).await
    }
    .await;
    release(connection, &db).await;

    result
}

/// Teardown, migrate and setup on an open transaction
pub async fn sync_cycle(
    ctx: &SyncContext<'_>,
    tx: &mut dyn SqlExecutor,
    tree: &SourceTree,
    migration_source: Option<&MigrationSource>,
    connection_id: &str,
) -> Result<()> {
    let timer = OperationTimer::start();
    teardown(tx, &tree.object_infos(), connection_id).await?;
    ctx.observer.on_teardown_success(connection_id, timer.elapsed_seconds());

    injection::setup(tx, ctx.config, connection_id).await?;

    if let Some(source) = migration_source {
        let table_name = ctx.config.migration.table_name.as_str();
        match migrations::apply_pending(tx, &source.bind(connection_id), table_name).await {
            Ok(applied) => ctx.observer.on_migration_success(connection_id, &applied),
            Err(e) => {
                ctx.observer.on_migration_failed(connection_id, &e);
                return Err(e);
            }
        }
    }

    setup(tx, tree, connection_id).await?;
    injection::cleanup(tx, ctx.config, connection_id).await?;

    Ok(())
}

/// Drop every managed object in reverse creation order
pub async fn teardown(
    tx: &mut dyn SqlExecutor,
    objects: &[SqlFileInfo],
    connection_id: &str,
) -> Result<()> {
    info!(connection = connection_id, count = objects.len(), "Dropping synchronized objects");
    rollback_sequentially(tx, objects, connection_id).await
}

/// Run hooks and objects in creation order
pub async fn setup(tx: &mut dyn SqlExecutor, tree: &SourceTree, connection_id: &str) -> Result<()> {
    run_sequentially(tx, &tree.pre_sync, connection_id).await?;
    info!(connection = connection_id, count = tree.objects.len(), "Creating objects");
    run_sequentially(tx, &tree.objects, connection_id).await?;
    run_sequentially(tx, &tree.post_sync, connection_id).await
}

/// Drop every managed object of one connection, leaving migrations untouched
pub async fn prune(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &PruneParams,
) -> OperationResult {
    let span = info_span!("prune", connection = %connection.id);

    async {
        let timer = OperationTimer::start();
        ctx.observer.on_started(&connection.id);

        let outcome = run_prune(ctx, connection, params).await;
        complete(ctx, &connection.id, &timer, outcome)
    }
    .instrument(span)
    .await
}

async fn run_prune(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &PruneParams,
) -> Result<()> {
    let objects: Vec<SqlFileInfo> = load_objects(ctx.config)
        .await?
        .into_iter()
        .filter_map(|code| code.info)
        .collect();

    let db = connection.connect().await?;
    let result = async {
        let mut tx = db.begin().await?;
        let timer = OperationTimer::start();
        let outcome = teardown(&mut tx, &objects, &connection.id).await;
        if outcome.is_ok() {
            ctx.observer.on_teardown_success(&connection.id, timer.elapsed_seconds());
        }
        finish_transaction(tx, outcome, params.dry_run, &connection.id).await
    }
    .await;
    release(connection, &db).await;

    result
}
