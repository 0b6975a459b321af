//! Engram daemon - HTTP surface over the layered agent-memory store

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use engram::config::Config;
use engram::consolidation::similarity;
use engram::error::Result;
use engram::server::MemoryServer;
use engram::storage::EntityStore;

/// Engram - layered long-term memory for autonomous coding agents
#[derive(Parser)]
#[command(name = "engramd")]
#[command(about = "Memory daemon exposing the Engram store over HTTP")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long, short = 'd', global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config, cli.data_dir).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,engram=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Engram daemon");

    let mut config = Config::load(config_path.as_deref())?;
    if let Some(data_dir) = data_dir {
        config.storage.data_dir = data_dir;
    }
    tracing::debug!("Config loaded: {:?}", config);

    tracing::info!(
        "Opening store at: {}",
        config.storage.data_dir.display()
    );
    let store = EntityStore::open(&config)?;

    let similarity = similarity::from_config(&config.similarity)?;
    tracing::info!("Similarity backend: {}", similarity.name());

    let server = MemoryServer::new(config, store, similarity);
    server.serve().await?;

    tracing::info!("Engram daemon stopped");
    Ok(())
}
