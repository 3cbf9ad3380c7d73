//! Standalone migration operations

use tracing::{info, info_span, Instrument};

use crate::db::connection::ConnectionDescriptor;
use crate::db::executor::SqlExecutor;
use crate::db::migrations::{self, MigrationStatus};
use crate::error::Result;
use crate::migration::{BoundMigrationSource, MigrationSource};
use crate::service::result::{OperationResult, OperationTimer};
use crate::service::{complete, finish_transaction, injection, release, SyncContext};

/// Options of migration operations
#[derive(Debug, Clone, Default)]
pub struct MigrateParams {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy)]
enum MigrateCommand {
    Latest,
    Rollback,
}

/// Apply every pending migration on one connection
pub async fn migrate_latest(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &MigrateParams,
) -> OperationResult<Vec<String>> {
    run_command(ctx, connection, params, MigrateCommand::Latest)
        .instrument(info_span!("migrate_latest", connection = %connection.id))
        .await
}

/// Roll back the latest migration batch on one connection
pub async fn migrate_rollback(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &MigrateParams,
) -> OperationResult<Vec<String>> {
    run_command(ctx, connection, params, MigrateCommand::Rollback)
        .instrument(info_span!("migrate_rollback", connection = %connection.id))
        .await
}

async fn run_command(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
    params: &MigrateParams,
    command: MigrateCommand,
) -> OperationResult<Vec<String>> {
    let timer = OperationTimer::start();
    ctx.observer.on_started(&connection.id);
    info!(?command, dry_run = params.dry_run, "Running migrations");

    let outcome = async {
        let source = MigrationSource::resolve(ctx.config, ctx.migration_loader).await?;
        let db = connection.connect().await?;

        let result = async {
            let mut tx = db.begin().await?;
            let outcome = migrate_in_transaction(
                ctx,
                &mut tx,
                &source.bind(&connection.id),
                command,
            )
            .await;
            match &outcome {
                Ok(names) => ctx.observer.on_migration_success(&connection.id, names),
                Err(e) => ctx.observer.on_migration_failed(&connection.id, e),
            }
            finish_transaction(tx, outcome, params.dry_run, &connection.id).await
        }
        .await;
        release(connection, &db).await;
        result
    }
    .await;

    complete(ctx, &connection.id, &timer, outcome)
}

async fn migrate_in_transaction(
    ctx: &SyncContext<'_>,
    tx: &mut dyn SqlExecutor,
    source: &BoundMigrationSource<'_>,
    command: MigrateCommand,
) -> Result<Vec<String>> {
    let table_name = ctx.config.migration.table_name.as_str();
    let connection_id = source.connection_id();

    injection::setup(tx, ctx.config, connection_id).await?;
    let names = match command {
        MigrateCommand::Latest => migrations::apply_pending(tx, source, table_name).await?,
        MigrateCommand::Rollback => migrations::rollback_batch(tx, source, table_name).await?,
    };
    injection::cleanup(tx, ctx.config, connection_id).await?;

    Ok(names)
}

/// List applied and pending migrations of one connection
pub async fn migrate_list(
    ctx: &SyncContext<'_>,
    connection: &ConnectionDescriptor,
) -> OperationResult<Vec<MigrationStatus>> {
    let span = info_span!("migrate_list", connection = %connection.id);

    async {
        let timer = OperationTimer::start();
        ctx.observer.on_started(&connection.id);

        let outcome = async {
            let source = MigrationSource::resolve(ctx.config, ctx.migration_loader).await?;
            let db = connection.connect().await?;

            let result = async {
                let mut tx = db.begin().await?;
                let table_name = ctx.config.migration.table_name.as_str();
                let outcome =
                    migrations::list(&mut tx, &source.bind(&connection.id), table_name).await;
                // Listing never changes anything, not even the history table
                finish_transaction(tx, outcome, true, &connection.id).await
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
