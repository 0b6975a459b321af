use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engram::config::Config;
use engram::storage::EntityStore;
use engram_cli::commands::{
    ConsolidateCommand, IndexCommand, PurgeCommand, RecordCommand, RetrieveCommand, ShowCommand,
    StatsCommand, TimelineCommand,
};
use engram_cli::error::CliResult;
use engram_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "engram-cli")]
#[command(about = "Engram CLI - Management tool for the agent-memory store")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(
        long,
        short = 'n',
        global = true,
        default_value = "default",
        help = "Namespace (project/workspace) to operate on"
    )]
    pub namespace: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show the Layer-1 namespace summary")]
    Index(IndexCommand),

    #[clap(about = "Show the Layer-2 timeline of recent activity")]
    Timeline(TimelineCommand),

    #[clap(about = "Retrieve memories for a task within a token budget")]
    Retrieve(RetrieveCommand),

    #[clap(about = "Consolidate episodes into patterns and skills")]
    Consolidate(ConsolidateCommand),

    #[clap(about = "Show one episode, pattern, or skill by id")]
    Show(ShowCommand),

    #[clap(about = "Record a completed task episode")]
    Record(RecordCommand),

    #[clap(about = "Show token-economics counters")]
    Stats(StatsCommand),

    #[clap(about = "Permanently delete a namespace")]
    Purge(PurgeCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    let store = EntityStore::open(&config)?;
    let namespace = cli.namespace.as_str();

    match &cli.command {
        Command::Index(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Timeline(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Retrieve(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Consolidate(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Show(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Record(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Stats(cmd) => cmd.execute(&store, &config, namespace, format),
        Command::Purge(cmd) => cmd.execute(&store, &config, namespace, format),
    }
}
