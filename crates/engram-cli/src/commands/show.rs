use chrono::Utc;
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use engram::config::Config;
use engram::memory::importance::decayed_importance;
use engram::memory::types::{EntityKind, MemoryEntity};
use engram::storage::EntityStore;
use uuid::Uuid;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct ShowCommand {
    #[clap(help = "Entity kind (episode, pattern, skill)")]
    pub kind: String,

    #[clap(help = "Entity ID (UUID format)")]
    pub id: String,
}

impl ShowCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        let kind: EntityKind = self.kind.parse()?;
        let id = Uuid::parse_str(&self.id).map_err(|e| format!("Invalid UUID format: {e}"))?;

        let entity = store.get(namespace, kind, id)?;
        let effective = decayed_importance(&entity, Utc::now(), &config.importance);

        match format {
            OutputFormat::Json => {
                let mut output = serde_json::to_value(&entity)?;
                if let Some(object) = output.as_object_mut() {
                    object.insert(
                        "effective_importance".to_string(),
                        serde_json::json!(effective),
                    );
                }
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID", &entity.id().to_string()]);
                table.add_row(["Kind", &entity.kind().to_string()]);
                table.add_row(["Namespace", entity.namespace()]);
                table.add_row(["Stored importance", &format!("{:.4}", entity.importance())]);
                table.add_row(["Effective importance", &format!("{effective:.4}")]);
                table.add_row(["Created", &format_timestamp(&entity.created_at())]);
                table.add_row(["Last accessed", &format_timestamp(&entity.last_accessed())]);
                table.add_row(["Access count", &entity.access_count().to_string()]);

                match &entity {
                    MemoryEntity::Episode(e) => {
                        table.add_row(["Task", &e.task_id]);
                        table.add_row(["Role", &e.role]);
                        table.add_row(["Goal", &e.goal]);
                        table.add_row(["Outcome", &format!("{:?}", e.outcome)]);
                        table.add_row(["Actions", &e.actions.join("\n")]);
                        table.add_row(["Error", e.error_detail.as_deref().unwrap_or("-")]);
                        table.add_row(["Archived", &e.archived.to_string()]);
                    }
                    MemoryEntity::Pattern(p) => {
                        table.add_row(["Category", &p.category]);
                        table.add_row(["Description", &p.description]);
                        table.add_row(["Confidence", &format!("{:.2}", p.confidence)]);
                        table.add_row([
                            "Provenance",
                            &p.provenance
                                .iter()
                                .map(|id| id.to_string())
                                .collect::<Vec<_>>()
                                .join("\n"),
                        ]);
                        table.add_row([
                            "Related",
                            &p.related
                                .iter()
                                .map(|id| id.to_string())
                                .collect::<Vec<_>>()
                                .join("\n"),
                        ]);
                        table.add_row([
                            "Deprecated by",
                            &p.deprecated_by
                                .map(|id| id.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                        ]);
                    }
                    MemoryEntity::Skill(s) => {
                        table.add_row(["Name", &s.name]);
                        table.add_row(["Steps", &s.steps.join("\n")]);
                        table.add_row(["Triggers", &s.triggers.join("\n")]);
                        table.add_row(["Success rate", &format!("{:.0}%", s.success_rate * 100.0)]);
                        table.add_row(["Usage count", &s.usage_count.to_string()]);
                    }
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}
