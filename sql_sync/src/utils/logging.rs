//! Logging setup
//!
//! Installs a global `tracing` subscriber. Without a `logging` section only
//! warnings are printed, unless `RUST_LOG` says otherwise.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

const CRATE_TARGET: &str = "sql_sync";

/// Initialize logging based on configuration
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let config = match config {
        Some(cfg) => cfg,
        None => {
            let filter = build_filter(Level::WARN)?;
            return install(
                fmt::Subscriber::builder()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .finish(),
            );
        }
    };

    let filter = build_filter(parse_level(&config.level))?;
    let json = config.format.eq_ignore_ascii_case("json");

    if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = Arc::new(File::create(file_path)?);

        if json {
            install(
                fmt::Subscriber::builder()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .with_ansi(false)
                    .finish(),
            )
        } else {
            install(
                fmt::Subscriber::builder()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .with_ansi(false)
                    .finish(),
            )
        }
    } else if config.stdout {
        if json {
            install(fmt::Subscriber::builder().json().with_env_filter(filter).finish())
        } else {
            install(fmt::Subscriber::builder().with_env_filter(filter).finish())
        }
    } else {
        Ok(())
    }
}

/// Map a configured level name; unknown names fall back to info
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_filter(level: Level) -> Result<EnvFilter> {
    let directive = format!("{}={}", CRATE_TARGET, level)
        .parse()
        .map_err(|e| Error::ConfigError(format!("Invalid log directive: {}", e)))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

fn install<S>(subscriber: S) -> Result<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber).map_err(|e| Error::Unknown(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("trace", Level::TRACE)]
    #[case("DEBUG", Level::DEBUG)]
    #[case("warn", Level::WARN)]
    #[case("error", Level::ERROR)]
    #[case("verbose", Level::INFO)]
    fn test_parse_level(#[case] name: &str, #[case] expected: Level) {
        assert_eq!(parse_level(name), expected);
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(Level::DEBUG).is_ok());
    }
}
