//! Run command implementation.
//!
//! `gantry run` plans and executes the requested steps.

use std::collections::HashMap;
use std::time::Duration;

use crate::cli::args::RunArgs;
use crate::error::{GantryError, Result};
use crate::runner::{RunProgress, RunReport, RunRequest};
use crate::state::{RunId, RunStatus, StepStatus};
use crate::ui::{format_duration, SpinnerHandle, UserInterface};

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

/// The run command implementation.
pub struct RunCommand {
    workspace: Workspace,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(workspace: &Workspace, args: RunArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }

    /// Build the orchestrator request: process env overlaid with `-e` values.
    fn request(&self) -> RunRequest {
        let mut env = self.workspace.env.clone();
        env.extend(self.args.targets.env.iter().cloned());

        RunRequest {
            targets: self.args.targets.all_targets(),
            env,
            force: self.args.force.clone(),
            force_all: self.args.force_all,
            resume: self.args.resume.as_deref().map(RunId::new),
            requested_outputs: self.args.outputs.clone(),
            max_parallel: self.args.max_parallel.map(usize::from),
        }
    }

    fn show_failures(ui: &mut dyn UserInterface, report: &RunReport) {
        for step in &report.steps {
            if step.status != StepStatus::Failed {
                continue;
            }
            let title = match (step.exit_code, &step.error) {
                (_, Some(error)) => format!("{} · {}", step.name, error),
                (Some(code), None) => format!("{} · exit {}", step.name, code),
                (None, None) => step.name.clone(),
            };
            ui.show_error_block(&title, step.output.as_deref().unwrap_or(""));
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.workspace.load()?;
        let app_name = project.app_name().to_string();
        let width = self
            .args
            .max_parallel
            .map(usize::from)
            .unwrap_or(project.config.settings.max_parallel);
        let orchestrator = project.orchestrator(self.workspace.cancel.clone());

        let json = self.args.json;
        let verbose = ui.output_mode().shows_command_output();
        if !json {
            ui.show_header(&format!("{} · run", app_name));
        }

        let mut spinners: HashMap<String, Box<dyn SpinnerHandle>> = HashMap::new();
        let report = orchestrator.submit_run_with_progress(self.request(), |progress| {
            if json {
                return;
            }
            match progress {
                RunProgress::Planned { run_id, order } => {
                    ui.message(&format!("Run {} · {} steps", run_id, order.len()));
                }
                RunProgress::StepSkipped { name, reason } => {
                    let status = StepStatus::Skipped {
                        reason: reason.clone(),
                    };
                    ui.message(&format!("⊘ {} {}", name, status));
                }
                RunProgress::StepStarting { name, index, total } => {
                    let label = format!("[{}/{}] {}", index, total, name);
                    if width <= 1 {
                        spinners.insert(name.to_string(), ui.start_spinner(&label));
                    } else {
                        ui.message(&format!("▸ {}", label));
                    }
                }
                RunProgress::StepFinished { name, result } => {
                    let duration = result
                        .duration_ms()
                        .map(|ms| format_duration(Duration::from_millis(ms)))
                        .unwrap_or_default();
                    let label = match result.attempts {
                        0 | 1 => format!("{} ({})", name, duration),
                        n => format!("{} ({}, {} attempts)", name, duration, n),
                    };
                    let succeeded = result.status == StepStatus::Succeeded;

                    match (spinners.remove(name), succeeded) {
                        (Some(mut spinner), true) => spinner.finish_success(&label),
                        (Some(mut spinner), false) => spinner.finish_error(&label),
                        (None, true) => ui.success(&label),
                        (None, false) => ui.error(&label),
                    }

                    if verbose {
                        for line in result.stdout.lines().chain(result.stderr.lines()) {
                            ui.message(&format!("    {}", line));
                        }
                    }
                }
            }
        });

        let report = report?;

        if json {
            let text = serde_json::to_string_pretty(&report)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
        } else {
            Self::show_failures(ui, &report);
            ui.show_run_summary(&report);
            for (key, value) in &report.outputs {
                ui.data(&format!("{}={}", key, value));
            }
            if report.status == RunStatus::Failed {
                ui.message(&format!(
                    "Fix the failure and resume with: gantry run --resume {}",
                    report.run_id
                ));
            }
        }

        Ok(CommandResult::from_exit_code(report.exit_code()))
    }
}
