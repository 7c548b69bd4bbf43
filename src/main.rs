//! # Resource Search CLI (`ressearch`)
//!
//! The `ressearch` binary is the operational interface for the service. It
//! provides commands for schema bootstrap, bulk data import, one-shot sync
//! runs, index reset, and starting the HTTP server with its recurring sync
//! schedule.
//!
//! ## Usage
//!
//! ```bash
//! ressearch --config ./config/ressearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ressearch init` | Create the `resource` table in Postgres |
//! | `ressearch import <file>` | Bulk-load a JSON catalog export |
//! | `ressearch sync` | Run one full convergence pass and exit |
//! | `ressearch sync-ratings` | Run one ratings refresh and exit |
//! | `ressearch reset-index` | Drop, recreate, and repopulate the index |
//! | `ressearch serve` | Start the HTTP server and the sync scheduler |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use resource_search::config::{load_config, Config};
use resource_search::index::{IndexSettings, MeiliIndex, SearchIndex};
use resource_search::scheduler::Scheduler;
use resource_search::server::{run_server, AppState};
use resource_search::store::{PgResourceStore, ResourceStore};
use resource_search::sync::SyncEngine;
use resource_search::{db, import, migrate};

/// Resource Search — keeps a Meilisearch index of educational resources
/// convergent with a Postgres catalog and serves search over HTTP.
#[derive(Parser)]
#[command(
    name = "ressearch",
    about = "Resource Search — Postgres-backed catalog with a Meilisearch query index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// `DATABASE_URL` and `MEILI_API_KEY` environment variables override
    /// the corresponding file entries.
    #[arg(long, global = true, default_value = "./config/ressearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the `resource` table and its secondary index. Idempotent —
    /// running it multiple times is safe.
    Init,

    /// Bulk-load a JSON catalog export into Postgres.
    ///
    /// Skipped when the table already contains rows; the whole import runs
    /// in one transaction.
    Import {
        /// Path to the JSON export (array of records).
        file: PathBuf,
    },

    /// Run one full convergence pass and exit.
    ///
    /// Re-derives every indexed document from Postgres and removes orphans.
    Sync,

    /// Run one ratings refresh and exit.
    ///
    /// Updates only the `averageRating` field of existing documents.
    SyncRatings,

    /// Reset the search index.
    ///
    /// Deletes the remote index, recreates it, reapplies the schema
    /// settings, and repopulates it with a full sync. For schema
    /// migrations — never scheduled.
    ResetIndex,

    /// Start the HTTP server and the recurring sync schedule.
    ///
    /// Applies the index schema, runs an initial full sync (failure is
    /// logged, not fatal — the hourly schedule retries), then serves.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized.");
        }
        Commands::Import { file } => {
            let pool = db::connect(&config).await?;
            let inserted = import::run_import(&pool, &file).await?;
            println!("Imported {} resources.", inserted);
        }
        Commands::Sync => {
            let engine = build_engine(&config).await?;
            engine.full_sync().await?;
            println!("Sync completed.");
        }
        Commands::SyncRatings => {
            let engine = build_engine(&config).await?;
            engine.ratings_sync().await?;
            println!("Ratings sync completed.");
        }
        Commands::ResetIndex => {
            let engine = build_engine(&config).await?;
            engine.reset_index().await?;
            println!("Index reset completed.");
        }
        Commands::Serve => {
            serve(&config).await?;
        }
    }

    Ok(())
}

/// Constructs the adapter handles and the engine. Built once per process;
/// everything downstream borrows these shared handles.
async fn build_adapters(
    config: &Config,
) -> Result<(Arc<dyn ResourceStore>, Arc<dyn SearchIndex>)> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn ResourceStore> = Arc::new(PgResourceStore::new(pool));

    let client = reqwest::Client::new();
    let index: Arc<dyn SearchIndex> = Arc::new(MeiliIndex::new(client, config));

    Ok((store, index))
}

async fn build_engine(config: &Config) -> Result<Arc<SyncEngine>> {
    let (store, index) = build_adapters(config).await?;
    let settings = IndexSettings::for_resources(config.index_settings.clone());
    Ok(Arc::new(SyncEngine::new(
        store,
        index,
        settings,
        &config.sync,
    )))
}

async fn serve(config: &Config) -> Result<()> {
    let (store, index) = build_adapters(config).await?;
    let settings = IndexSettings::for_resources(config.index_settings.clone());
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        index.clone(),
        settings,
        &config.sync,
    ));

    // Startup sequence mirrors the schedule it hands off to: configure the
    // schema, converge once, then let the timers take over. A failed
    // initial pass is logged — the hourly full sync is the retry.
    if let Err(err) = engine.configure_index().await {
        error!("initial schema configuration failed: {:#}", err);
    }
    if let Err(err) = engine.full_sync().await {
        error!("initial full sync failed: {:#}", err);
    } else {
        info!("initial full sync completed");
    }

    let mut scheduler = Scheduler::new(engine.clone(), &config.sync);
    scheduler.start();

    let state = AppState {
        store,
        index,
        engine,
    };
    run_server(config, state).await
}
