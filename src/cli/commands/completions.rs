//! Shell completions generation.

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::{GantryError, Result};
use crate::ui::UserInterface;
use clap::CommandFactory;

use super::dispatcher::{Command, CommandResult};

/// `gantry completions <SHELL>`.
pub struct CompletionsCommand {
    args: CompletionsArgs,
}

impl CompletionsCommand {
    pub fn new(args: CompletionsArgs) -> Self {
        Self { args }
    }

    fn render(&self) -> Result<String> {
        let mut cmd = Cli::command();
        let mut buf = Vec::new();
        clap_complete::generate(self.args.shell, &mut cmd, "gantry", &mut buf);
        String::from_utf8(buf).map_err(|e| GantryError::Other(e.into()))
    }
}

impl Command for CompletionsCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        ui.data(self.render()?.trim_end());
        Ok(CommandResult::success())
    }
}
