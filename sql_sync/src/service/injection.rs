//! Config injection
//!
//! Configured variables are written to a key/value table inside the sync
//! transaction so that migrations and object scripts can read them. The table
//! is dropped again before the transaction ends; if a script fails, the
//! transaction rollback discards it.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db::executor::SqlExecutor;
use crate::error::Result;

/// `$$` is a literal dollar sign; `${NAME}` and `$NAME` are references
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("environment variable pattern is valid")
});

/// Create the injected config table and fill it with the configured variables
pub async fn setup(tx: &mut dyn SqlExecutor, config: &Config, connection_id: &str) -> Result<()> {
    let table = config.injected_config.table.as_str();

    if tx.table_exists(table).await? {
        warn!(
            connection = connection_id,
            table, "Injected config table already exists, recreating it"
        );
        tx.execute(&format!("DROP TABLE IF EXISTS {}", table)).await?;
    }

    let driver = tx.driver();
    tx.execute(&format!(
        "CREATE TABLE {} ({} VARCHAR(255) NOT NULL PRIMARY KEY, {} TEXT)",
        table,
        driver.quote_identifier("key"),
        driver.quote_identifier("value")
    ))
    .await?;

    let vars = expand_vars(&config.injected_config.vars, |name| std::env::var(name).ok());
    if vars.is_empty() {
        debug!(connection = connection_id, "No config to inject");
        return Ok(());
    }

    let rows: Vec<String> = vars
        .iter()
        .map(|(key, value)| {
            format!(
                "({}, {})",
                driver.quote_literal(key),
                driver.quote_literal(value)
            )
        })
        .collect();

    tx.execute(&format!(
        "INSERT INTO {} ({}, {}) VALUES {}",
        table,
        driver.quote_identifier("key"),
        driver.quote_identifier("value"),
        rows.join(", ")
    ))
    .await?;

    debug!(connection = connection_id, count = vars.len(), "Injected config");
    Ok(())
}

/// Drop the injected config table
pub async fn cleanup(tx: &mut dyn SqlExecutor, config: &Config, connection_id: &str) -> Result<()> {
    let table = config.injected_config.table.as_str();
    tx.execute(&format!("DROP TABLE IF EXISTS {}", table)).await?;
    debug!(connection = connection_id, table, "Removed injected config table");
    Ok(())
}

/// Expand `${NAME}` and `$NAME` references in every value
pub fn expand_vars<F>(vars: &IndexMap<String, String>, lookup: F) -> IndexMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .map(|(key, value)| (key.clone(), expand_value(value, &lookup)))
        .collect()
}

/// Expand references in a single value.
///
/// Unset variables expand to nothing; write `$$` for a literal `$`.
pub fn expand_value<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_VAR_PATTERN
        .replace_all(value, |caps: &Captures| {
            let name = match caps.get(1).or_else(|| caps.get(2)) {
                Some(name) => name.as_str(),
                None => return "$".to_string(),
            };

            lookup(name).unwrap_or_else(|| {
                warn!(variable = name, "Environment variable is not set");
                String::new()
            })
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::testing::RecordingExecutor;
    use pretty_assertions::assert_eq;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "REGION" => Some("eu-west".to_string()),
            "TIER" => Some("gold".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_value() {
        assert_eq!(expand_value("${REGION}", lookup), "eu-west");
        assert_eq!(expand_value("$REGION-$TIER", lookup), "eu-west-gold");
        assert_eq!(expand_value("plain", lookup), "plain");
        assert_eq!(expand_value("x${MISSING}y", lookup), "xy");
    }

    #[test]
    fn test_expand_value_keeps_escaped_dollar_signs() {
        assert_eq!(expand_value("pa$$word", lookup), "pa$word");
        assert_eq!(expand_value("$$REGION", lookup), "$REGION");
        assert_eq!(expand_value("$$${REGION}", lookup), "$eu-west");
        assert_eq!(expand_value("cost: 5$", lookup), "cost: 5$");
    }

    #[test]
    fn test_expand_vars_keeps_order() {
        let mut vars = IndexMap::new();
        vars.insert("b".to_string(), "$TIER".to_string());
        vars.insert("a".to_string(), "static".to_string());

        let expanded = expand_vars(&vars, lookup);

        assert_eq!(
            expanded.into_iter().collect::<Vec<_>>(),
            vec![
                ("b".to_string(), "gold".to_string()),
                ("a".to_string(), "static".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_without_vars_only_creates_table() {
        let config = Config::default();
        let mut tx = RecordingExecutor::new();

        setup(&mut tx, &config, "test").await.unwrap();

        assert_eq!(tx.statements.len(), 1);
        assert!(tx.statements[0].starts_with("CREATE TABLE __sync_db_injected_config"));
    }

    #[tokio::test]
    async fn test_setup_recreates_leftover_table() {
        let mut config = Config::default();
        config
            .injected_config
            .vars
            .insert("app".to_string(), "it's".to_string());
        let mut tx = RecordingExecutor::new();
        tx.existing_tables.push("__sync_db_injected_config".to_string());

        setup(&mut tx, &config, "test").await.unwrap();

        assert_eq!(tx.statements[0], "DROP TABLE IF EXISTS __sync_db_injected_config");
        assert_eq!(
            tx.statements[2],
            "INSERT INTO __sync_db_injected_config (\"key\", \"value\") VALUES ('app', 'it''s')"
        );
    }

    #[tokio::test]
    async fn test_cleanup_drops_table() {
        let config = Config::default();
        let mut tx = RecordingExecutor::new();

        cleanup(&mut tx, &config, "test").await.unwrap();

        assert_eq!(tx.statements, vec!["DROP TABLE IF EXISTS __sync_db_injected_config"]);
    }
}
