use clap::Parser;
use engram::config::Config;
use engram::storage::EntityStore;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct PurgeCommand {
    #[clap(long, help = "Confirm the irreversible deletion")]
    pub yes: bool,
}

impl PurgeCommand {
    pub fn execute(
        &self,
        store: &EntityStore,
        _config: &Config,
        namespace: &str,
        format: OutputFormat,
    ) -> CliResult<()> {
        if !self.yes {
            return Err(format!(
                "Refusing to purge namespace '{namespace}' without --yes; this deletes every entity permanently."
            )
            .into());
        }

        let deleted = store.delete_namespace(namespace)?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "namespace": namespace,
                    "deleted": deleted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if deleted {
                    println!("Namespace '{namespace}' purged.");
                } else {
                    println!("Namespace '{namespace}' does not exist.");
                }
            }
        }

        Ok(())
    }
}
