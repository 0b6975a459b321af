pub mod consolidate;
pub mod index;
pub mod purge;
pub mod record;
pub mod retrieve;
pub mod show;
pub mod stats;
pub mod timeline;

pub use consolidate::ConsolidateCommand;
pub use index::IndexCommand;
pub use purge::PurgeCommand;
pub use record::RecordCommand;
pub use retrieve::RetrieveCommand;
pub use show::ShowCommand;
pub use stats::StatsCommand;
pub use timeline::TimelineCommand;
