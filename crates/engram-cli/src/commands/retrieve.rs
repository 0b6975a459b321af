use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::config::Config;
use engram::consolidation::similarity;
use engram::economics::EconomicsTracker;
use engram::memory::retrieval::{RetrievalRequest, Retriever};
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct RetrieveCommand {
    #[clap(help = "Free-text description of the task at hand")]
    pub query: String,

    #[clap(long, short, help = "Task-type tag (e.g. bugfix, refactor)")]
    pub task_type: Option<String>,

    #[clap(long, short, help = "Token budget (config default when omitted)")]
    pub budget: Option<usize>,
}

impl RetrieveCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let sim = similarity::from_config(&config.similarity)?;
        let retriever = Retriever::new(store, sim.as_ref(), &config.retrieval, &config.importance);

        let request = RetrievalRequest {
            namespace: namespace.to_string(),
            task_type: self.task_type.clone(),
            query: self.query.clone(),
            budget: self.budget,
        };
        let (result, sample) = retriever.retrieve(&request)?;

        if let Err(e) = EconomicsTracker::new(store).record(namespace, sample) {
            eprintln!("Warning: failed to record retrieval economics: {e}");
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table => {
                println!(
                    "Budget {} tokens; spent {} (index {}, timeline {}, full {})",
                    result.budget,
                    result.cost.total(),
                    result.cost.index_tokens,
                    result.cost.timeline_tokens,
                    result.cost.full_tokens
                );

                if let Some(ref summary) = result.summary {
                    println!(
                        "Namespace '{}': {} episodes, {} patterns, {} skills",
                        summary.namespace,
                        summary.counts.episodes,
                        summary.counts.patterns,
                        summary.counts.skills
                    );
                }

                if result.entities.is_empty() {
                    println!("\nNo entities disclosed at full detail.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Relevance", "Kind", "ID", "Summary", "Tokens"]);

                for scored in &result.entities {
                    table.add_row([
                        format!("{:.3}", scored.relevance),
                        scored.entity.kind().to_string(),
                        truncate_string(&scored.entity.id().to_string(), 8),
                        truncate_string(&scored.entity.summary_line(), 60),
                        scored.cost_tokens.to_string(),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}
