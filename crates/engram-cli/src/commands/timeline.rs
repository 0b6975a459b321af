use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::config::Config;
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct TimelineCommand {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of timeline entries to display"
    )]
    pub limit: usize,
}

impl TimelineCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        _config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let meta = store.read_meta(namespace)?;
        let entries = meta.timeline_page(self.limit);

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Table => {
                if entries.is_empty() {
                    println!("No recent activity in namespace '{namespace}'.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Kind", "Summary", "Importance", "Created"]);

                for entry in entries {
                    table.add_row([
                        truncate_string(&entry.id.to_string(), 8),
                        entry.kind.to_string(),
                        truncate_string(&entry.line, 60),
                        format!("{:.2}", entry.importance),
                        format_timestamp(&entry.created_at),
                    ]);
                }

                println!("{table}");
                println!("\nShowing {} of {} entries", entries.len(), meta.timeline.len());
            }
        }

        Ok(())
    }
}
