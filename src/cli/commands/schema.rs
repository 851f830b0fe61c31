//! `gantry schema`: JSON Schema of the configuration file.

use crate::config::GantryConfig;
use crate::error::{GantryError, Result};
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};

/// Prints the configuration schema.
pub struct SchemaCommand;

impl Command for SchemaCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let schema = schemars::schema_for!(GantryConfig);
        let json =
            serde_json::to_string_pretty(&schema).map_err(|e| GantryError::Other(e.into()))?;
        ui.data(&json);
        Ok(CommandResult::success())
    }
}
