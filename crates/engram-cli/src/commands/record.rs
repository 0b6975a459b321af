use clap::Parser;
use engram::config::Config;
use engram::consolidation::{Consolidator, similarity};
use engram::events::{EventBus, MemoryEvent};
use engram::memory::importance::initial_importance;
use engram::memory::types::{EpisodeTrace, MemoryEntity, Outcome};
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct RecordCommand {
    #[clap(help = "What the task was trying to achieve")]
    pub goal: String,

    #[clap(long, short, help = "Task identifier from the orchestrator")]
    pub task: String,

    #[clap(long, short, default_value = "agent", help = "Acting role")]
    pub role: String,

    #[clap(long = "action", short = 'a', help = "Action summary (repeatable, in order)")]
    pub actions: Vec<String>,

    #[clap(long, short, default_value = "success", help = "Outcome (success, partial, failure)")]
    pub outcome: String,

    #[clap(long, short, help = "Free-text error detail for failures")]
    pub error: Option<String>,
}

impl RecordCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let outcome: Outcome = self.outcome.parse()?;

        let mut trace = EpisodeTrace::new(
            namespace,
            &self.task,
            &self.role,
            &self.goal,
            self.actions.clone(),
            outcome,
        );
        trace.error_detail = self.error.clone();

        let mut entity = MemoryEntity::Episode(trace);
        entity.set_importance(initial_importance(&entity, &config.importance));

        let id = entity.id();
        store.put(&entity)?;
        EventBus::default().emit(MemoryEvent::episode_recorded(namespace, id));

        let sim = similarity::from_config(&config.similarity)?;
        let due = Consolidator::new(store, sim.as_ref(), &config.consolidation, &config.importance)
            .should_run(namespace)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "id": id.to_string(),
                    "created": true,
                    "consolidation_due": due,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Episode recorded.");
                println!("ID: {id}");
                if due {
                    println!("Consolidation threshold reached; run `consolidate` to promote patterns.");
                }
            }
        }

        Ok(())
    }
}
