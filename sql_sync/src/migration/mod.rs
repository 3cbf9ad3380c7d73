//! Migration sources
//!
//! A migration source supplies ordered migration names and their up/down
//! actions. Two storage formats are supported behind [`MigrationSource`]:
//! SQL file pairs and compiled [`MigrationScript`]s.

pub mod registry;
pub mod sql_source;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, MigrationSourceType};
use crate::db::executor::SqlExecutor;
use crate::error::{Error, Result};

pub use registry::{MigrationLoader, ScriptMigrationSource, ScriptRegistry};
pub use sql_source::SqlMigrationSource;

/// Direction a migration is run in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Migration implemented in Rust, run against the live transaction
#[async_trait]
pub trait MigrationScript: Send + Sync {
    async fn up(&self, tx: &mut dyn SqlExecutor) -> Result<()>;

    async fn down(&self, tx: &mut dyn SqlExecutor) -> Result<()>;
}

/// One side of a migration
#[derive(Clone)]
pub enum MigrationAction {
    Sql(String),
    Script {
        script: Arc<dyn MigrationScript>,
        direction: Direction,
    },
    /// Nothing to run in this direction
    Noop,
}

impl MigrationAction {
    /// Run the action; returns `false` when there was nothing to do
    pub async fn run(&self, tx: &mut dyn SqlExecutor) -> Result<bool> {
        match self {
            MigrationAction::Sql(sql) => {
                tx.execute(sql).await?;
                Ok(true)
            }
            MigrationAction::Script { script, direction } => {
                match direction {
                    Direction::Up => script.up(tx).await?,
                    Direction::Down => script.down(tx).await?,
                }
                Ok(true)
            }
            MigrationAction::Noop => Ok(false),
        }
    }
}

impl fmt::Debug for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationAction::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            MigrationAction::Script { direction, .. } => {
                f.debug_struct("Script").field("direction", direction).finish()
            }
            MigrationAction::Noop => f.write_str("Noop"),
        }
    }
}

/// A named migration with both of its actions
#[derive(Debug, Clone)]
pub struct MigrationEntry {
    pub name: String,
    pub up: MigrationAction,
    pub down: MigrationAction,
}

impl MigrationEntry {
    /// Action for the given direction
    pub fn action(&self, direction: Direction) -> &MigrationAction {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

/// Every supported migration storage format
pub enum MigrationSource {
    Sql(SqlMigrationSource),
    Script(ScriptMigrationSource),
}

impl MigrationSource {
    /// Build the migration source configured for this run.
    ///
    /// Script sources need a loader; SQL sources read the migration directory.
    pub async fn resolve(config: &Config, loader: Option<&dyn MigrationLoader>) -> Result<Self> {
        let directory = config.migration_path();

        match config.migration.source_type {
            MigrationSourceType::Sql => Ok(MigrationSource::Sql(
                SqlMigrationSource::load(&directory).await?,
            )),
            MigrationSourceType::Script => {
                let loader = loader.ok_or_else(|| {
                    Error::ConfigError(
                        "script migrations require a registered migration loader".to_string(),
                    )
                })?;
                Ok(MigrationSource::Script(ScriptMigrationSource::from_loader(
                    loader, &directory,
                )?))
            }
        }
    }

    /// Migration names in the order they are applied
    pub fn keys(&self) -> Vec<String> {
        match self {
            MigrationSource::Sql(source) => source.keys(),
            MigrationSource::Script(source) => source.keys(),
        }
    }

    /// Look up a migration by name
    pub fn get(&self, name: &str) -> Result<MigrationEntry> {
        match self {
            MigrationSource::Sql(source) => source.get(name),
            MigrationSource::Script(source) => source.get(name),
        }
    }

    /// Scope this source to a connection for logging
    pub fn bind(&self, connection_id: &str) -> BoundMigrationSource<'_> {
        BoundMigrationSource {
            source: self,
            connection_id: connection_id.to_string(),
        }
    }
}

/// A migration source scoped to one connection
pub struct BoundMigrationSource<'a> {
    source: &'a MigrationSource,
    connection_id: String,
}

impl<'a> BoundMigrationSource<'a> {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn keys(&self) -> Vec<String> {
        let keys = self.source.keys();
        debug!(connection = %self.connection_id, count = keys.len(), "Listed migrations");
        keys
    }

    pub fn get(&self, name: &str) -> Result<MigrationEntry> {
        debug!(connection = %self.connection_id, migration = name, "Loading migration");
        self.source.get(name)
    }
}
