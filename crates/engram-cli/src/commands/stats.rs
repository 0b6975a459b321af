use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::config::Config;
use engram::economics::EconomicsTracker;
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Reset the counters for this namespace")]
    pub reset: bool,
}

impl StatsCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        _config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let tracker = EconomicsTracker::new(store);

        if self.reset {
            tracker.reset(namespace)?;
            match format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "namespace": namespace,
                            "reset": true,
                        }))?
                    );
                }
                OutputFormat::Table => {
                    println!("Economics counters reset for namespace '{namespace}'.");
                }
            }
            return Ok(());
        }

        let counters = tracker.read(namespace)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "namespace": namespace,
                    "retrievals": counters.retrievals,
                    "discovery_tokens": counters.discovery_tokens,
                    "full_tokens": counters.full_tokens,
                    "full_equivalent_tokens": counters.full_equivalent_tokens,
                    "savings_tokens": counters.savings(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Metric", "Value"]);

                table.add_row(["Retrieval calls", &counters.retrievals.to_string()]);
                table.add_row(["Discovery tokens", &counters.discovery_tokens.to_string()]);
                table.add_row(["Full-read tokens", &counters.full_tokens.to_string()]);
                table.add_row([
                    "Full-equivalent tokens",
                    &counters.full_equivalent_tokens.to_string(),
                ]);
                table.add_row(["Tokens saved by discovery", &counters.savings().to_string()]);

                println!("{table}");
            }
        }

        Ok(())
    }
}
