use clap::Parser;
use engram::config::Config;
use engram::consolidation::{Consolidator, similarity};
use engram::events::{EventBus, MemoryEvent};
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConsolidateCommand {
    #[clap(long, short, help = "Run even if the trigger threshold is not reached")]
    pub force: bool,
}

impl ConsolidateCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let sim = similarity::from_config(&config.similarity)?;
        let consolidator =
            Consolidator::new(store, sim.as_ref(), &config.consolidation, &config.importance);

        let result = consolidator.run(namespace, self.force)?;

        if result.ran {
            EventBus::default().emit(MemoryEvent::consolidation_completed(
                namespace,
                result.pattern_ids.first().copied(),
            ));
        }

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Table => {
                if !result.ran {
                    println!(
                        "Consolidation skipped: threshold not reached (use --force to run anyway)."
                    );
                    return Ok(());
                }
                println!("Consolidation complete for namespace '{namespace}'.");
                println!("  Episodes examined:     {}", result.episodes_seen);
                println!("  Clusters found:        {}", result.clusters);
                println!("  Patterns created:      {}", result.patterns_created);
                println!("  Patterns strengthened: {}", result.patterns_strengthened);
                println!("  Skills created:        {}", result.skills_created);
                println!("  Skills strengthened:   {}", result.skills_strengthened);
                println!("  Episodes archived:     {}", result.episodes_archived);
            }
        }

        Ok(())
    }
}
