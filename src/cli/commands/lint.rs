//! Lint command implementation.
//!
//! `gantry lint` validates the configuration and reports every problem
//! found, not just the first.

use serde::Serialize;

use crate::cli::args::LintArgs;
use crate::config::{load_config, validate_config, ValidationError};
use crate::error::{GantryError, Result};
use crate::runner::EXIT_CONFIGURATION;
use crate::ui::theme::GantryTheme;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

#[derive(Debug, Serialize)]
struct Finding<'a> {
    rule: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<&'a str>,
}

impl<'a> From<&'a ValidationError> for Finding<'a> {
    fn from(error: &'a ValidationError) -> Self {
        Self {
            rule: &error.rule,
            message: &error.message,
            step: error.step.as_deref(),
            workflow: error.workflow.as_deref(),
        }
    }
}

/// The lint command implementation.
pub struct LintCommand {
    workspace: Workspace,
    args: LintArgs,
}

impl LintCommand {
    /// Create a new lint command.
    pub fn new(workspace: &Workspace, args: LintArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }
}

impl Command for LintCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let config = load_config(
            &self.workspace.project_root,
            self.workspace.config.as_deref(),
        )?;
        let errors = validate_config(&config);
        tracing::debug!(count = errors.len(), "configuration validated");

        let result = if errors.is_empty() {
            CommandResult::success()
        } else {
            CommandResult::failure(EXIT_CONFIGURATION)
        };

        if self.args.json {
            let findings: Vec<Finding<'_>> = errors.iter().map(Finding::from).collect();
            let text = serde_json::to_string_pretty(&findings)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
            return Ok(result);
        }

        if errors.is_empty() {
            ui.success(&format!(
                "Configuration is valid ({} steps)",
                config.steps.len()
            ));
            return Ok(result);
        }

        let theme = GantryTheme::new();
        for error in &errors {
            let location = match (&error.step, &error.workflow) {
                (Some(step), _) => format!("step '{}'", step),
                (None, Some(workflow)) => format!("workflow '{}'", workflow),
                (None, None) => "settings".to_string(),
            };
            ui.error(&format!(
                "{} {}: {}",
                theme.dim.apply_to(format!("[{}]", error.rule)),
                location,
                error.message
            ));
        }
        ui.message(&format!(
            "{} problem{} found",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));

        Ok(result)
    }
}
