//! sql_sync CLI

use anyhow::Context;
use clap::{Parser, Subcommand};
use sql_sync::config::{self, DEFAULT_CONFIG_FILE};
use sql_sync::db::connection::resolve_connections;
use sql_sync::utils::logging::init_logging;
use sql_sync::{
    Error, MigrateParams, OperationResult, PruneParams, ResultSummary, RunScriptParams, SyncClient,
    SyncObserver, SynchronizeParams,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sql_sync")]
#[command(about = "Synchronize SQL objects and migrations across databases")]
#[command(version)]
struct Cli {
    /// Path to the YAML or TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// JSON file listing the connections; defaults to connections.sync-db.json, then DB_* variables
    #[arg(long)]
    connection_resolver: Option<PathBuf>,

    /// Run against a single connection id
    #[arg(long, global = true)]
    only: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate every object, applying pending migrations
    Synchronize {
        /// Run everything, then roll back
        #[arg(long)]
        dry_run: bool,

        /// Do not run pending migrations
        #[arg(long)]
        skip_migration: bool,
    },

    /// Drop every synchronized object
    Prune {
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending migrations
    MigrateLatest {
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back the latest migration batch
    MigrateRollback {
        #[arg(long)]
        dry_run: bool,
    },

    /// List applied and pending migrations
    MigrateList,

    /// Run manual scripts not yet run
    RunManualScripts {
        #[arg(long)]
        dry_run: bool,
    },
}

/// Prints lifecycle events to stdout
struct ConsoleObserver;

impl SyncObserver for ConsoleObserver {
    fn on_started(&self, connection_id: &str) {
        println!("▸ {}", connection_id);
    }

    fn on_teardown_success(&self, connection_id: &str, time_elapsed: f64) {
        println!("  [{}] objects dropped ({:.2}s)", connection_id, time_elapsed);
    }

    fn on_migration_success(&self, connection_id: &str, applied: &[String]) {
        if applied.is_empty() {
            println!("  [{}] migrations already up to date", connection_id);
        }
        for name in applied {
            println!("  [{}] migrated {}", connection_id, name);
        }
    }

    fn on_migration_failed(&self, connection_id: &str, error: &Error) {
        eprintln!("  [{}] migration failed: {}", connection_id, error);
    }

    fn on_success(&self, connection_id: &str, time_elapsed: f64) {
        println!("✓ {} ({:.2}s)", connection_id, time_elapsed);
    }

    fn on_failed(&self, connection_id: &str, error: &Error) {
        eprintln!("✗ {}: {}", connection_id, error);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every connection succeeded
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let config = config::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    init_logging(&config.logging)?;

    let connections = resolve_connections(cli.connection_resolver.as_deref())
        .context("Failed to resolve connections")?;
    let client = SyncClient::new(config, connections).with_observer(Arc::new(ConsoleObserver));
    let only = cli.only.as_deref();

    let summary = match cli.command {
        Commands::Synchronize { dry_run, skip_migration } => {
            let params = SynchronizeParams { dry_run, skip_migration };
            summarize(&client.synchronize(&params, only).await?)
        }
        Commands::Prune { dry_run } => summarize(&client.prune(&PruneParams { dry_run }, only).await?),
        Commands::MigrateLatest { dry_run } => {
            let results = client.migrate_latest(&MigrateParams { dry_run }, only).await?;
            summarize(&results)
        }
        Commands::MigrateRollback { dry_run } => {
            let results = client.migrate_rollback(&MigrateParams { dry_run }, only).await?;
            for result in &results {
                if let Some(names) = &result.data {
                    for name in names {
                        println!("  [{}] rolled back {}", result.connection_id, name);
                    }
                }
            }
            summarize(&results)
        }
        Commands::MigrateList => {
            let results = client.migrate_list(only).await?;
            for result in &results {
                if let Some(statuses) = &result.data {
                    println!("{}:", result.connection_id);
                    for status in statuses {
                        let mark = if status.applied { "applied" } else { "pending" };
                        println!("  {:<8} {}", mark, status.name);
                    }
                }
            }
            summarize(&results)
        }
        Commands::RunManualScripts { dry_run } => {
            let results = client.run_scripts(&RunScriptParams { dry_run }, only).await?;
            for result in &results {
                if let Some(names) = &result.data {
                    for name in names {
                        println!("  [{}] ran {}", result.connection_id, name);
                    }
                }
            }
            summarize(&results)
        }
    };

    Ok(summary.all_succeeded())
}

fn summarize<T>(results: &[OperationResult<T>]) -> ResultSummary {
    let summary = ResultSummary::of(results);
    println!(
        "\n{} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    summary
}
