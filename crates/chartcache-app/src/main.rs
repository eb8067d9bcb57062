//! chartcache CLI - service worker cache host.
//!
//! Provides commands for:
//! - `install`: Precache the manifest and activate the configured version
//! - `fetch`: Route requests through the active worker
//! - `message`: Post a control message to a worker
//! - `clear-songs`: Drop cached songs-list queries
//! - `partitions`: List stored partitions

mod commands;
mod config;
mod host;

use std::path::PathBuf;

use chartcache_common::init_logging;
use clap::{Parser, Subcommand};
use tracing::Level;

use commands::{ClearSongsArgs, FetchArgs, InstallArgs, MessageArgs, PartitionsArgs};
use config::AppConfig;
use host::Host;

/// chartcache - offline cache for the LeSongs chart.
#[derive(Parser)]
#[command(name = "chartcache", version, about)]
struct Cli {
    /// Path to configuration file (default: platform config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cache database file (overrides config).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Precache the manifest and activate the configured version.
    Install(InstallArgs),
    /// Request URLs through the active worker.
    Fetch(FetchArgs),
    /// Post a JSON control message to a worker.
    Message(MessageArgs),
    /// Drop every cached songs-list query.
    ClearSongs(ClearSongsArgs),
    /// List stored partitions.
    Partitions(PartitionsArgs),
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if cli.verbose {
        config.log.level = Level::DEBUG;
    }
    config.cache.validate()?;
    init_logging(&config.log)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut host = Host::open(config)?;
        match cli.command {
            Commands::Install(args) => args.execute(&mut host).await,
            Commands::Fetch(args) => args.execute(&mut host).await,
            Commands::Message(args) => args.execute(&mut host).await,
            Commands::ClearSongs(args) => args.execute(&mut host).await,
            Commands::Partitions(args) => args.execute(&mut host).await,
        }
    })
}
