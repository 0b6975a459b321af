use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::config::Config;
use engram::index::IndexSummary;
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct IndexCommand {
    #[clap(long, help = "Rebuild the index from the entity files first")]
    pub rebuild: bool,
}

impl IndexCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        _config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let meta = if self.rebuild {
            store.rebuild_meta(namespace)?
        } else {
            store.read_meta(namespace)?
        };
        let summary = IndexSummary::from_meta(namespace, &meta);

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["Namespace", namespace]);
                table.add_row(["Episodes", &summary.counts.episodes.to_string()]);
                table.add_row(["Patterns", &summary.counts.patterns.to_string()]);
                table.add_row(["Skills", &summary.counts.skills.to_string()]);
                table.add_row(["Unconsolidated", &summary.new_episodes.to_string()]);
                table.add_row([
                    "Last consolidated",
                    &summary
                        .last_consolidated
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                ]);
                for (category, count) in &summary.categories {
                    table.add_row([&format!("Category: {category}"), &count.to_string()]);
                }

                println!("{table}");

                if !summary.top_patterns.is_empty() {
                    println!("\nTop patterns:");
                    for title in &summary.top_patterns {
                        println!(
                            "  {:.2}  {}  {}",
                            title.importance,
                            title.id,
                            truncate_string(&title.title, 60)
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
