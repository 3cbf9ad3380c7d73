//! Configuration handling for sql_sync

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::service::execution::ExecutionStrategy;
use crate::utils::naming::resolve_object_info;

/// Default name of the configuration file looked up by the CLI
pub const DEFAULT_CONFIG_FILE: &str = "sync-db.yml";

/// Load configuration from a YAML or TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

    let config: Config = if is_toml {
        toml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?
    } else {
        serde_yaml::from_str(&config_str)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?
    };

    Ok(config)
}

/// Represents the complete sql_sync configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory every sql, hook, migration and manual path is relative to
    pub base_path: PathBuf,
    pub execution: ExecutionStrategy,
    /// Object source files in creation order; discovered from `base_path` when empty
    pub sql: Vec<String>,
    pub hooks: HooksConfig,
    pub injected_config: InjectedConfig,
    pub migration: MigrationConfig,
    pub manual: ManualConfig,
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("src/sql"),
            execution: ExecutionStrategy::default(),
            sql: Vec::new(),
            hooks: HooksConfig::default(),
            injected_config: InjectedConfig::default(),
            migration: MigrationConfig::default(),
            manual: ManualConfig::default(),
            logging: None,
        }
    }
}

impl Config {
    /// Classify every configured object path without touching the filesystem.
    ///
    /// Runs before any connection is attempted so that a misnamed file aborts
    /// the whole invocation instead of failing once per connection.
    pub fn validate(&self) -> Result<()> {
        for path in &self.sql {
            resolve_object_info(path)?;
        }

        if self.injected_config.table.trim().is_empty() {
            return Err(Error::ConfigError(
                "injected_config.table must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Absolute-or-relative directory holding migration files
    pub fn migration_path(&self) -> PathBuf {
        self.base_path.join(&self.migration.directory)
    }

    /// Directory holding manual one-off scripts
    pub fn manual_path(&self) -> PathBuf {
        self.base_path.join(&self.manual.directory)
    }
}

/// Scripts run around the main object setup
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HooksConfig {
    pub pre_sync: Vec<String>,
    pub post_sync: Vec<String>,
}

/// Key/value pairs made visible to scripts for the duration of a sync
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InjectedConfig {
    pub table: String,
    pub vars: IndexMap<String, String>,
}

impl Default for InjectedConfig {
    fn default() -> Self {
        Self {
            table: "__sync_db_injected_config".to_string(),
            vars: IndexMap::new(),
        }
    }
}

/// Kind of files found in the migration directory
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MigrationSourceType {
    /// `<name>.up.sql` / `<name>.down.sql` pairs
    #[default]
    Sql,
    /// Compiled `MigrationScript`s supplied by a `MigrationLoader`
    Script,
}

/// Migration settings configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MigrationConfig {
    pub directory: String,
    pub table_name: String,
    pub source_type: MigrationSourceType,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: "migration".to_string(),
            table_name: "sync_db_migrations".to_string(),
            source_type: MigrationSourceType::Sql,
        }
    }
}

/// Manual one-off scripts configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ManualConfig {
    pub directory: String,
    pub table_name: String,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            directory: "manual".to_string(),
            table_name: "sync_db_manual_scripts".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_yaml_config_with_defaults() {
        let yaml = r#"
base_path: db/sql
execution: parallel
sql:
  - schema/app.sql
  - view/app/users.sql
hooks:
  post_sync:
    - hooks/grants.sql
injected_config:
  vars:
    app_name: demo
    region: ${REGION}
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.base_path, PathBuf::from("db/sql"));
        assert_eq!(config.execution, ExecutionStrategy::Parallel);
        assert_eq!(config.sql.len(), 2);
        assert!(config.hooks.pre_sync.is_empty());
        assert_eq!(config.hooks.post_sync, vec!["hooks/grants.sql".to_string()]);
        assert_eq!(config.injected_config.table, "__sync_db_injected_config");
        assert_eq!(
            config.injected_config.vars.keys().collect::<Vec<_>>(),
            vec!["app_name", "region"]
        );
        assert_eq!(config.migration.table_name, "sync_db_migrations");
        assert_eq!(config.migration_path(), PathBuf::from("db/sql/migration"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_config() {
        let toml_str = r#"
base_path = "sql"
sql = ["function/util/now_utc.sql"]

[migration]
directory = "migrations"
source_type = "script"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.execution, ExecutionStrategy::Sequential);
        assert_eq!(config.migration.source_type, MigrationSourceType::Script);
        assert_eq!(config.manual_path(), PathBuf::from("sql/manual"));
    }

    #[test]
    fn test_unknown_execution_strategy_is_rejected() {
        let result: std::result::Result<Config, _> = serde_yaml::from_str("execution: eventually");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_unsupported_object() {
        let config = Config {
            sql: vec!["table/users.sql".to_string()],
            ..Config::default()
        };

        assert!(matches!(
            config.validate(),
            Err(Error::UnsupportedObject { .. })
        ));
    }
}
