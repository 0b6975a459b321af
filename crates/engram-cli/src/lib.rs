pub mod commands;
pub mod error;
pub mod output;

pub use commands::{
    ConsolidateCommand, IndexCommand, PurgeCommand, RecordCommand, RetrieveCommand, ShowCommand,
    StatsCommand, TimelineCommand,
};
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, format_timestamp, truncate_string};
