//! sql_sync: keeps database objects and migrations in sync with a source tree
//!
//! Views, functions, procedures, triggers and schemas are kept as SQL files
//! named `<type>/[<schema>/]<name>.sql`. A sync drops every managed object,
//! applies pending migrations and recreates the objects, all in a single
//! transaction per connection.

pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod service;
pub mod sql;
pub mod utils;

use futures::FutureExt;
use std::path::Path;
use std::sync::Arc;

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::{ConnectionDescriptor, DatabaseConnection, DriverKind};
pub use db::executor::{SqlExecutor, SyncTransaction};
pub use db::migrations::MigrationStatus;
pub use error::{Error, Result};
pub use migration::{MigrationLoader, MigrationScript, MigrationSource, ScriptRegistry};
pub use service::execution::ExecutionStrategy;
pub use service::migrate::MigrateParams;
pub use service::manual::RunScriptParams;
pub use service::observer::{NoopObserver, SyncObserver};
pub use service::result::{OperationResult, ResultSummary};
pub use service::sync::{PruneParams, SynchronizeParams};

use config::MigrationSourceType;
use service::execution::execute_processes;
use service::SyncContext;

/// Load configuration and connections, then build a client
pub async fn init(config_path: impl AsRef<Path>, connections_path: Option<&Path>) -> Result<SyncClient> {
    let config = config::load_from_file(config_path)?;
    let connections = db::connection::resolve_connections(connections_path)?;
    Ok(SyncClient::new(config, connections))
}

/// The main client for running operations across every configured connection
pub struct SyncClient {
    config: Config,
    connections: Vec<ConnectionDescriptor>,
    observer: Arc<dyn SyncObserver>,
    migration_loader: Option<Arc<dyn MigrationLoader>>,
}

impl SyncClient {
    pub fn new(config: Config, connections: Vec<ConnectionDescriptor>) -> Self {
        Self {
            config,
            connections,
            observer: Arc::new(NoopObserver),
            migration_loader: None,
        }
    }

    /// Receive lifecycle notifications of every connection
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Supply script migrations
    pub fn with_migration_loader(mut self, loader: Arc<dyn MigrationLoader>) -> Self {
        self.migration_loader = Some(loader);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connections(&self) -> &[ConnectionDescriptor] {
        &self.connections
    }

    /// Synchronize every selected connection.
    ///
    /// Fails only on pre-flight errors; otherwise yields one result per connection.
    pub async fn synchronize(
        &self,
        params: &SynchronizeParams,
        only: Option<&str>,
    ) -> Result<Vec<OperationResult>> {
        self.config.validate()?;
        if !params.skip_migration {
            self.check_migration_loader()?;
        }
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::sync::synchronize(&ctx, connection, params).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    /// Drop every managed object on the selected connections
    pub async fn prune(&self, params: &PruneParams, only: Option<&str>) -> Result<Vec<OperationResult>> {
        self.config.validate()?;
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::sync::prune(&ctx, connection, params).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    /// Apply pending migrations on the selected connections
    pub async fn migrate_latest(
        &self,
        params: &MigrateParams,
        only: Option<&str>,
    ) -> Result<Vec<OperationResult<Vec<String>>>> {
        self.check_migration_loader()?;
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::migrate::migrate_latest(&ctx, connection, params).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    /// Roll back the latest migration batch on the selected connections
    pub async fn migrate_rollback(
        &self,
        params: &MigrateParams,
        only: Option<&str>,
    ) -> Result<Vec<OperationResult<Vec<String>>>> {
        self.check_migration_loader()?;
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::migrate::migrate_rollback(&ctx, connection, params).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    /// List migration status of the selected connections
    pub async fn migrate_list(
        &self,
        only: Option<&str>,
    ) -> Result<Vec<OperationResult<Vec<MigrationStatus>>>> {
        self.check_migration_loader()?;
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::migrate::migrate_list(&ctx, connection).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    /// Run manual scripts not yet run on the selected connections
    pub async fn run_scripts(
        &self,
        params: &RunScriptParams,
        only: Option<&str>,
    ) -> Result<Vec<OperationResult<Vec<String>>>> {
        let connections = self.select_connections(only)?;
        let ctx = self.context();

        let processes = connections
            .into_iter()
            .map(|connection| service::manual::run_scripts(&ctx, connection, params).boxed())
            .collect();

        Ok(execute_processes(processes, self.config.execution).await)
    }

    fn context(&self) -> SyncContext<'_> {
        let ctx = SyncContext::new(&self.config, self.observer.as_ref());
        match &self.migration_loader {
            Some(loader) => ctx.with_migration_loader(loader.as_ref()),
            None => ctx,
        }
    }

    fn check_migration_loader(&self) -> Result<()> {
        if self.config.migration.source_type == MigrationSourceType::Script
            && self.migration_loader.is_none()
        {
            return Err(Error::ConfigError(
                "script migrations require a registered migration loader".to_string(),
            ));
        }
        Ok(())
    }

    /// Every connection, or only the one with the given id
    fn select_connections(&self, only: Option<&str>) -> Result<Vec<&ConnectionDescriptor>> {
        let selected: Vec<&ConnectionDescriptor> = match only {
            Some(id) => self.connections.iter().filter(|c| c.id == id).collect(),
            None => self.connections.iter().collect(),
        };

        if selected.is_empty() {
            return Err(Error::ConnectionError(match only {
                Some(id) => format!("No connection found with id '{}'", id),
                None => "No connections configured".to_string(),
            }));
        }

        Ok(selected)
    }
}
