//! List command implementation.
//!
//! `gantry list` shows declared steps and workflows.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::args::ListArgs;
use crate::error::{GantryError, Result};
use crate::ui::theme::GantryTheme;
use crate::ui::UserInterface;

use super::dispatcher::{Command, CommandResult};
use super::project::Workspace;

#[derive(Debug, Serialize)]
struct StepListing<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    depends_on: &'a [String],
}

#[derive(Debug, Serialize)]
struct Listing<'a> {
    steps: Vec<StepListing<'a>>,
    workflows: BTreeMap<&'a str, &'a [String]>,
}

/// The list command implementation.
pub struct ListCommand {
    workspace: Workspace,
    args: ListArgs,
}

impl ListCommand {
    /// Create a new list command.
    pub fn new(workspace: &Workspace, args: ListArgs) -> Self {
        Self {
            workspace: workspace.clone(),
            args,
        }
    }
}

impl Command for ListCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let project = self.workspace.load()?;
        let registry = &project.registry;

        let listing = Listing {
            steps: registry
                .iter()
                .map(|step| StepListing {
                    name: &step.name,
                    description: step.description.as_deref(),
                    depends_on: &step.depends_on,
                })
                .collect(),
            workflows: registry
                .workflows()
                .iter()
                .map(|(name, targets)| (name.as_str(), targets.as_slice()))
                .collect(),
        };

        if self.args.json {
            let text = serde_json::to_string_pretty(&listing)
                .map_err(|e| GantryError::Other(e.into()))?;
            ui.data(&text);
            return Ok(CommandResult::success());
        }

        let theme = GantryTheme::new();

        ui.message(&format!("  {}", theme.highlight.apply_to("Steps:")));
        for step in &listing.steps {
            ui.message(&format!("    {}", theme.highlight.apply_to(step.name)));
            if let Some(desc) = step.description {
                ui.message(&format!("      {}", theme.dim.apply_to(desc)));
            }
            if !step.depends_on.is_empty() {
                ui.message(&format!(
                    "      {}",
                    theme
                        .dim
                        .apply_to(format!("└── depends on: {}", step.depends_on.join(", ")))
                ));
            }
        }

        if !listing.workflows.is_empty() {
            ui.message("");
            ui.message(&format!("  {}", theme.highlight.apply_to("Workflows:")));
            for (name, targets) in &listing.workflows {
                ui.message(&format!(
                    "    {}{} {}",
                    theme.highlight.apply_to(name),
                    theme.dim.apply_to(":"),
                    theme.dim.apply_to(targets.join(", ")),
                ));
            }
        }

        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use std::fs;
    use tempfile::TempDir;

    fn setup_project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".gantry")).unwrap();
        fs::write(
            temp.path().join(".gantry/config.yml"),
            r#"
steps:
  - name: build
    description: Build the image
    program: docker
    args: [build, .]
  - name: push
    program: docker
    args: [push, app]
    depends_on: [build]
workflows:
  default: [push]
"#,
        )
        .unwrap();
        temp
    }

    #[test]
    fn lists_steps_in_declaration_order() {
        let temp = setup_project();
        let mut ui = MockUI::new();

        let result = ListCommand::new(&Workspace::new(temp.path()), ListArgs::default())
            .execute(&mut ui)
            .unwrap();

        assert!(result.success);
        let build = ui.messages().iter().position(|m| m.contains("build")).unwrap();
        let push = ui.messages().iter().position(|m| m.contains("push")).unwrap();
        assert!(build < push);
        assert!(ui.has_message("Build the image"));
        assert!(ui.has_message("depends on: build"));
        assert!(ui.has_message("Workflows:"));
    }

    #[test]
    fn json_listing() {
        let temp = setup_project();
        let mut ui = MockUI::new();

        ListCommand::new(&Workspace::new(temp.path()), ListArgs { json: true })
            .execute(&mut ui)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&ui.data_lines()[0]).unwrap();
        assert_eq!(value["steps"][1]["name"], "push");
        assert_eq!(value["steps"][1]["depends_on"][0], "build");
        assert_eq!(value["workflows"]["default"][0], "push");
    }
}
