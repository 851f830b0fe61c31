//! History command implementation.
//!
//! `gantry history` lists recent runs, newest first.

use serde::Serialize;

use crate::cli::args::HistoryArgs;
use crate::error::{GantryError, Result};
use crate::runner::RunReport;
use crate::state::{ExecutionStateStore, RunId, RunStatus};
use crate::ui::theme::GantryTheme;
use crate::ui::{format_relative_time, Table, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

#[derive(Debug, Serialize)]
struct HistoryEntry {
    run_id: RunId,
    status: RunStatus,
    created_at: chrono::DateTime<chrono::Utc>,
    targets: Vec<String>,
    succeeded: usize,
    skipped: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    resumed_from: Option<RunId>,
}

/// The history command implementation.
pub struct HistoryCommand {
    workspace: Workspace,
    args: HistoryArgs,
}

impl HistoryCommand {
    /// Create a new history command.
    pub fn new(workspace: &Workspace, args: HistoryArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }

    fn entries(&self, store: &dyn ExecutionStateStore) -> Result<Vec<HistoryEntry>> {
        store
            .list_runs()?
            .into_iter()
            .take(self.args.limit)
            .map(|run| {
                let report = RunReport::load(store, &run.id)?;
                let (succeeded, skipped, failed) = report.counts();
                Ok(HistoryEntry {
                    run_id: run.id,
                    status: run.status,
                    created_at: run.created_at,
                    targets: run.targets,
                    succeeded,
                    skipped,
                    failed,
                    resumed_from: run.resumed_from,
                })
            })
            .collect()
    }
}

impl Command for HistoryCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.workspace.load()?;
        let store = project.store();
        let entries = self.entries(store.as_ref())?;

        if self.args.json {
            let text = serde_json::to_string_pretty(&entries)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
            return Ok(CommandResult::success());
        }

        if entries.is_empty() {
            ui.message("No runs recorded yet.");
            return Ok(CommandResult::success());
        }

        let theme = GantryTheme::new();
        let mut table = Table::new(["RUN", "STATUS", "STARTED", "TARGETS", "STEPS"]);
        for entry in &entries {
            let status = match entry.status {
                RunStatus::Completed => theme.success.apply_to(entry.status).to_string(),
                RunStatus::Failed => theme.error.apply_to(entry.status).to_string(),
                _ => theme.warning.apply_to(entry.status).to_string(),
            };
            table.add_row([
                entry.run_id.to_string(),
                status,
                theme
                    .duration
                    .apply_to(format_relative_time(entry.created_at))
                    .to_string(),
                entry.targets.join(", "),
                format!(
                    "{} ok, {} skipped, {} failed",
                    entry.succeeded, entry.skipped, entry.failed
                ),
            ]);
        }

        for line in table.render().lines() {
            ui.message(line);
        }

        Ok(CommandResult::success())
    }
}
