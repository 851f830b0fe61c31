//! Plan command implementation.
//!
//! `gantry plan` shows the order a run would use and which steps it would
//! skip, without executing or recording anything.

use crate::cli::args::PlanArgs;
use crate::error::{GantryError, Result};
use crate::runner::{PlannedAction, RunRequest};
use crate::ui::theme::GantryTheme;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

/// The plan command implementation.
pub struct PlanCommand {
    workspace: Workspace,
    args: PlanArgs,
}

impl PlanCommand {
    /// Create a new plan command.
    pub fn new(workspace: &Workspace, args: PlanArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }
}

impl Command for PlanCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.workspace.load()?;
        let app_name = project.app_name().to_string();
        let orchestrator = project.orchestrator(self.workspace.cancel.clone());

        let mut env = self.workspace.env.clone();
        env.extend(self.args.targets.env.iter().cloned());
        let mut request = RunRequest::new(self.args.targets.all_targets()).with_env(env);
        request.force = self.args.force.clone();

        let plan = orchestrator.plan(&request)?;

        if self.args.json {
            let text = serde_json::to_string_pretty(&plan)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
            return Ok(CommandResult::success());
        }

        let theme = GantryTheme::new();
        ui.show_header(&format!("{} · plan", app_name));

        for (level, group) in plan.groups.iter().enumerate() {
            ui.message(&format!(
                "  {}",
                theme.dim.apply_to(format!("level {}", level + 1))
            ));
            for name in group {
                let Some(step) = plan.steps.iter().find(|s| &s.name == name) else {
                    continue;
                };
                let line = match step.action {
                    PlannedAction::Execute => {
                        format!("    ▸ {}", theme.highlight.apply_to(&step.name))
                    }
                    PlannedAction::Skip => format!(
                        "    {} {}",
                        theme.dim.apply_to(format!("⊘ {}", step.name)),
                        theme.dim.apply_to("(already satisfied)")
                    ),
                };
                ui.message(&line);
            }
        }

        ui.message("");
        ui.message(&format!(
            "{} to run, {} already satisfied",
            plan.execute_count(),
            plan.steps.len() - plan.execute_count()
        ));

        Ok(CommandResult::success())
    }
}
