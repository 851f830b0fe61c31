//! Status command implementation.
//!
//! `gantry status` shows the step results of a run (the latest by default).

use std::time::Duration;

use crate::cli::args::StatusArgs;
use crate::error::{GantryError, Result};
use crate::runner::RunReport;
use crate::state::{ExecutionStateStore, RunId};
use crate::ui::theme::GantryTheme;
use crate::ui::{format_duration, Table, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

/// The status command implementation.
pub struct StatusCommand {
    workspace: Workspace,
    args: StatusArgs,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(workspace: &Workspace, args: StatusArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }

    fn target_run(&self, store: &dyn ExecutionStateStore) -> Result<Option<RunId>> {
        match &self.args.run {
            Some(id) => Ok(Some(RunId::new(id.as_str()))),
            None => Ok(store.list_runs()?.into_iter().next().map(|run| run.id)),
        }
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.workspace.load()?;
        let store = project.store();

        let Some(run_id) = self.target_run(store.as_ref())? else {
            ui.message("No runs recorded yet. Start one with 'gantry run'.");
            return Ok(CommandResult::success());
        };

        let report = RunReport::load(store.as_ref(), &run_id)?;

        if self.args.json {
            let text = serde_json::to_string_pretty(&report)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
            return Ok(CommandResult::success());
        }

        let theme = GantryTheme::new();
        ui.show_header(&format!("{} · {}", project.app_name(), report.run_id));
        ui.message(&format!("Status: {}", report.status));
        if let Some(prior) = &report.resumed_from {
            ui.message(&format!("Resumed from: {}", prior));
        }
        ui.message("");

        let mut table = Table::new(["", "STEP", "STATUS", "ATTEMPTS", "DURATION"]);
        for step in &report.steps {
            let duration = step
                .duration_ms
                .filter(|_| step.attempts > 0)
                .map(|ms| format_duration(Duration::from_millis(ms)))
                .unwrap_or_default();
            table.add_row([
                theme.status_icon(&step.status),
                step.name.clone(),
                step.status.to_string(),
                step.attempts.to_string(),
                duration,
            ]);
        }
        for line in table.render().lines() {
            ui.message(line);
        }

        for step in &report.steps {
            if let Some(error) = &step.error {
                ui.warning(&format!("{}: {}", step.name, error));
            }
        }

        Ok(CommandResult::success())
    }
}
