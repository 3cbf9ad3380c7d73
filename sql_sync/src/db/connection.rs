//! Database connection handling
//!
//! This module resolves connection descriptors and establishes `sqlx` pools.

use serde::{Deserialize, Serialize};
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    MySql, Pool, Postgres, Sqlite,
};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::db::executor::SyncTransaction;
use crate::error::{Error, Result};

/// Default name of the connections file
pub const DEFAULT_CONNECTIONS_FILE: &str = "connections.sync-db.json";

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DriverKind {
    Postgres,
    MySql,
    Sqlite,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Postgres => "postgres",
            DriverKind::MySql => "mysql",
            DriverKind::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier such as a column name
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            DriverKind::MySql => format!("`{}`", name.replace('`', "``")),
            DriverKind::Postgres | DriverKind::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Quote a string literal
    pub fn quote_literal(&self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        match self {
            // MySQL treats backslashes as escapes by default
            DriverKind::MySql => format!("'{}'", escaped.replace('\\', "\\\\")),
            DriverKind::Postgres | DriverKind::Sqlite => format!("'{}'", escaped),
        }
    }

    /// Column definition of an auto-incrementing primary key named `id`
    pub fn auto_increment_primary_key(&self) -> &'static str {
        match self {
            DriverKind::Postgres => "id SERIAL PRIMARY KEY",
            DriverKind::MySql => "id INT AUTO_INCREMENT PRIMARY KEY",
            DriverKind::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Query returning a positive count when `table` exists.
    ///
    /// `table` may be qualified as `schema.table`; unqualified names are looked
    /// up in the current schema (search path on Postgres).
    pub fn table_exists_query(&self, table: &str) -> String {
        match self {
            DriverKind::Postgres => format!(
                "SELECT COUNT(*) FROM pg_catalog.pg_class WHERE oid = to_regclass({})",
                self.quote_literal(table)
            ),
            DriverKind::MySql => {
                let (schema, name) = split_qualified(table);
                let schema = match schema {
                    Some(schema) => self.quote_literal(schema),
                    None => "DATABASE()".to_string(),
                };
                format!(
                    "SELECT COUNT(*) FROM information_schema.tables \
                     WHERE table_schema = {} AND table_name = {}",
                    schema,
                    self.quote_literal(name)
                )
            }
            DriverKind::Sqlite => {
                let (schema, name) = split_qualified(table);
                let master = match schema {
                    Some(schema) => format!("{}.sqlite_master", self.quote_identifier(schema)),
                    None => "sqlite_master".to_string(),
                };
                format!(
                    "SELECT COUNT(*) FROM {} WHERE type = 'table' AND name = {}",
                    master,
                    self.quote_literal(name)
                )
            }
        }
    }

    fn default_port(&self) -> Option<u16> {
        match self {
            DriverKind::Postgres => Some(5432),
            DriverKind::MySql => Some(3306),
            DriverKind::Sqlite => None,
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(DriverKind::Postgres),
            "mysql" | "mysql2" => Ok(DriverKind::MySql),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            other => Err(Error::ConnectionError(format!(
                "Unsupported database driver: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DriverKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DriverKind> for String {
    fn from(driver: DriverKind) -> Self {
        driver.as_str().to_string()
    }
}

/// Parameters used to open a connection pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// SQLite database file
    pub filename: Option<String>,
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub pool_size: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

/// Where a connection comes from
#[derive(Debug, Clone)]
pub enum ConnectionTarget {
    Params(ConnectionParams),
    /// An already established pool supplied by the host application
    Live(DatabaseConnection),
}

/// A named database a sync cycle runs against
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub id: String,
    pub driver: DriverKind,
    pub target: ConnectionTarget,
}

impl ConnectionDescriptor {
    /// Describe a connection opened from parameters.
    ///
    /// Without an explicit id the descriptor is named `host/database`.
    pub fn from_params(id: Option<String>, driver: DriverKind, params: ConnectionParams) -> Self {
        let id = id.unwrap_or_else(|| derive_connection_id(&params));
        Self {
            id,
            driver,
            target: ConnectionTarget::Params(params),
        }
    }

    /// Describe an already established pool
    pub fn from_live(id: impl Into<String>, connection: DatabaseConnection) -> Self {
        Self {
            id: id.into(),
            driver: connection.driver(),
            target: ConnectionTarget::Live(connection),
        }
    }

    /// Obtain a pool for this connection
    pub async fn connect(&self) -> Result<DatabaseConnection> {
        match &self.target {
            ConnectionTarget::Live(connection) => Ok(connection.clone()),
            ConnectionTarget::Params(params) => DatabaseConnection::connect(self.driver, params).await,
        }
    }
}

/// Split `schema.table` into its parts
fn split_qualified(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

fn derive_connection_id(params: &ConnectionParams) -> String {
    match (&params.host, &params.database, &params.filename) {
        (Some(host), Some(database), _) => format!("{}/{}", host, database),
        (Some(host), None, _) => host.clone(),
        (None, Some(database), _) => database.clone(),
        (None, None, Some(filename)) => filename.clone(),
        (None, None, None) => params.url.clone().unwrap_or_else(|| "default".to_string()),
    }
}

/// Pool of one of the supported database types
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

impl DatabaseConnection {
    /// Create a new connection pool from parameters
    pub async fn connect(driver: DriverKind, params: &ConnectionParams) -> Result<Self> {
        let pool_size = params.pool_size.unwrap_or(5);
        let timeout = Duration::from_secs(params.timeout_seconds.unwrap_or(30));

        match driver {
            DriverKind::Postgres => {
                let options = match &params.url {
                    Some(url) => PgConnectOptions::from_str(url)?,
                    None => {
                        let mut options = PgConnectOptions::new()
                            .host(params.host.as_deref().unwrap_or("localhost"))
                            .port(params.port.or(driver.default_port()).unwrap_or(5432));
                        if let Some(user) = &params.user {
                            options = options.username(user);
                        }
                        if let Some(password) = &params.password {
                            options = options.password(password);
                        }
                        if let Some(database) = &params.database {
                            options = options.database(database);
                        }
                        options
                    }
                };

                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;

                Ok(DatabaseConnection::Postgres(pool))
            }
            DriverKind::MySql => {
                let options = match &params.url {
                    Some(url) => MySqlConnectOptions::from_str(url)?,
                    None => {
                        let mut options = MySqlConnectOptions::new()
                            .host(params.host.as_deref().unwrap_or("localhost"))
                            .port(params.port.or(driver.default_port()).unwrap_or(3306));
                        if let Some(user) = &params.user {
                            options = options.username(user);
                        }
                        if let Some(password) = &params.password {
                            options = options.password(password);
                        }
                        if let Some(database) = &params.database {
                            options = options.database(database);
                        }
                        options
                    }
                };

                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;

                Ok(DatabaseConnection::MySql(pool))
            }
            DriverKind::Sqlite => {
                let options = match (&params.url, &params.filename) {
                    (Some(url), _) => SqliteConnectOptions::from_str(url)?,
                    (None, Some(filename)) => SqliteConnectOptions::new()
                        .filename(filename)
                        .create_if_missing(true),
                    (None, None) => {
                        return Err(Error::ConnectionError(
                            "sqlite connections require a filename or url".to_string(),
                        ));
                    }
                };

                let pool = SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect_with(options)
                    .await?;

                Ok(DatabaseConnection::Sqlite(pool))
            }
        }
    }

    /// Driver of this pool
    pub fn driver(&self) -> DriverKind {
        match self {
            DatabaseConnection::Postgres(_) => DriverKind::Postgres,
            DatabaseConnection::MySql(_) => DriverKind::MySql,
            DatabaseConnection::Sqlite(_) => DriverKind::Sqlite,
        }
    }

    /// Begin a transaction on a pooled connection
    pub async fn begin(&self) -> Result<SyncTransaction> {
        let tx = match self {
            DatabaseConnection::Postgres(pool) => SyncTransaction::Postgres(pool.begin().await?),
            DatabaseConnection::MySql(pool) => SyncTransaction::MySql(pool.begin().await?),
            DatabaseConnection::Sqlite(pool) => SyncTransaction::Sqlite(pool.begin().await?),
        };
        Ok(tx)
    }

    /// Close every connection of the pool
    pub async fn close(&self) {
        match self {
            DatabaseConnection::Postgres(pool) => pool.close().await,
            DatabaseConnection::MySql(pool) => pool.close().await,
            DatabaseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

/// One entry of a connections file
#[derive(Debug, Clone, Deserialize)]
struct ConnectionEntry {
    id: Option<String>,
    #[serde(alias = "driver")]
    client: DriverKind,
    #[serde(flatten)]
    params: ConnectionParams,
}

#[derive(Debug, Deserialize)]
struct ConnectionsFile {
    connections: Vec<ConnectionEntry>,
}

/// Load connections from a JSON file of the form `{"connections": [...]}`
pub fn load_connections_file(path: impl AsRef<Path>) -> Result<Vec<ConnectionDescriptor>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ConnectionsFile = serde_json::from_str(&content)?;

    Ok(file
        .connections
        .into_iter()
        .map(|entry| ConnectionDescriptor::from_params(entry.id, entry.client, entry.params))
        .collect())
}

/// Resolve a single connection from `DB_*` environment variables
pub fn connection_from_env(vars: &HashMap<String, String>) -> Result<ConnectionDescriptor> {
    let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

    let driver: DriverKind = get("DB_CLIENT")
        .unwrap_or_else(|| "postgres".to_string())
        .parse()?;

    let required: &[&str] = match driver {
        DriverKind::Sqlite => &["DB_NAME"],
        _ => &["DB_HOST", "DB_USERNAME", "DB_PASSWORD", "DB_NAME"],
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| get(*key).is_none())
        .collect();

    if !missing.is_empty() {
        return Err(Error::ConnectionError(format!(
            "Following environment variables were not set: {}",
            missing.join(", ")
        )));
    }

    let port = match get("DB_PORT") {
        Some(port) => Some(port.parse::<u16>().map_err(|e| {
            Error::ConnectionError(format!("Invalid DB_PORT '{}': {}", port, e))
        })?),
        None => None,
    };

    let params = match driver {
        DriverKind::Sqlite => ConnectionParams {
            filename: get("DB_NAME"),
            ..ConnectionParams::default()
        },
        _ => ConnectionParams {
            host: get("DB_HOST"),
            port,
            user: get("DB_USERNAME"),
            password: get("DB_PASSWORD"),
            database: get("DB_NAME"),
            ..ConnectionParams::default()
        },
    };

    Ok(ConnectionDescriptor::from_params(get("DB_ID"), driver, params))
}

/// Resolve the connections of an invocation.
///
/// An explicit file wins, then the default connections file in the working
/// directory, then the `DB_*` environment variables.
pub fn resolve_connections(path: Option<&Path>) -> Result<Vec<ConnectionDescriptor>> {
    if let Some(path) = path {
        return load_connections_file(path);
    }

    let default_path = Path::new(DEFAULT_CONNECTIONS_FILE);
    if default_path.exists() {
        return load_connections_file(default_path);
    }

    let vars: HashMap<String, String> = std::env::vars().collect();
    Ok(vec![connection_from_env(&vars)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_driver_aliases() {
        assert_eq!("pg".parse::<DriverKind>().unwrap(), DriverKind::Postgres);
        assert_eq!("mysql2".parse::<DriverKind>().unwrap(), DriverKind::MySql);
        assert_eq!("SQLITE3".parse::<DriverKind>().unwrap(), DriverKind::Sqlite);
        assert!("mssql".parse::<DriverKind>().is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(DriverKind::Postgres.quote_identifier("key"), "\"key\"");
        assert_eq!(DriverKind::MySql.quote_identifier("key"), "`key`");
        assert_eq!(DriverKind::Postgres.quote_literal("it's"), "'it''s'");
        assert_eq!(DriverKind::MySql.quote_literal("a\\b"), "'a\\\\b'");
    }

    #[rstest]
    #[case(
        DriverKind::Postgres,
        "cfg.injected",
        "SELECT COUNT(*) FROM pg_catalog.pg_class WHERE oid = to_regclass('cfg.injected')"
    )]
    #[case(
        DriverKind::Postgres,
        "__sync_db_injected_config",
        "SELECT COUNT(*) FROM pg_catalog.pg_class WHERE oid = to_regclass('__sync_db_injected_config')"
    )]
    #[case(
        DriverKind::MySql,
        "cfg.injected",
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'cfg' AND table_name = 'injected'"
    )]
    #[case(
        DriverKind::MySql,
        "injected",
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = 'injected'"
    )]
    #[case(
        DriverKind::Sqlite,
        "aux.injected",
        "SELECT COUNT(*) FROM \"aux\".sqlite_master WHERE type = 'table' AND name = 'injected'"
    )]
    #[case(
        DriverKind::Sqlite,
        "injected",
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'injected'"
    )]
    fn test_table_exists_query_is_schema_aware(
        #[case] driver: DriverKind,
        #[case] table: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(driver.table_exists_query(table), expected);
    }

    #[test]
    fn test_connection_id_defaults_to_host_and_database() {
        let params = ConnectionParams {
            host: Some("db.internal".to_string()),
            database: Some("sales".to_string()),
            ..ConnectionParams::default()
        };
        let descriptor = ConnectionDescriptor::from_params(None, DriverKind::Postgres, params);
        assert_eq!(descriptor.id, "db.internal/sales");

        let explicit = ConnectionDescriptor::from_params(
            Some("primary".to_string()),
            DriverKind::Postgres,
            ConnectionParams::default(),
        );
        assert_eq!(explicit.id, "primary");
    }

    #[test]
    fn test_connection_from_env_reports_missing_variables() {
        let err = connection_from_env(&env(&[("DB_HOST", "localhost")])).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("DB_USERNAME"));
        assert!(message.contains("DB_PASSWORD"));
        assert!(message.contains("DB_NAME"));
        assert!(!message.contains("DB_HOST"));
    }

    #[test]
    fn test_connection_from_env() {
        let descriptor = connection_from_env(&env(&[
            ("DB_CLIENT", "mysql"),
            ("DB_HOST", "localhost"),
            ("DB_PORT", "3307"),
            ("DB_USERNAME", "root"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "inventory"),
        ]))
        .unwrap();

        assert_eq!(descriptor.id, "localhost/inventory");
        assert_eq!(descriptor.driver, DriverKind::MySql);
        match descriptor.target {
            ConnectionTarget::Params(params) => assert_eq!(params.port, Some(3307)),
            ConnectionTarget::Live(_) => panic!("expected connection params"),
        }
    }

    #[test]
    fn test_load_connections_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONNECTIONS_FILE);
        std::fs::write(
            &path,
            r#"{
                "connections": [
                    {"id": "main", "client": "pg", "host": "localhost", "database": "app"},
                    {"client": "sqlite", "filename": "local.db"}
                ]
            }"#,
        )
        .unwrap();

        let connections = load_connections_file(&path).unwrap();

        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].id, "main");
        assert_eq!(connections[1].id, "local.db");
        assert_eq!(connections[1].driver, DriverKind::Sqlite);
    }
}
