//! Command dispatching.
//!
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use crate::cli::args::Commands;
use crate::error::Result;
use crate::ui::UserInterface;

use super::project::Workspace;

/// A CLI subcommand.
pub trait Command {
    /// Execute the command.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Process exit code.
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }

    /// Result carrying a run's exit code.
    pub fn from_exit_code(exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
        }
    }
}

/// Routes CLI subcommands to their implementations.
pub struct CommandDispatcher {
    workspace: Workspace,
}

impl CommandDispatcher {
    /// Create a dispatcher for a workspace.
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }

    /// The workspace commands run in.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, command: &Commands, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let ws = &self.workspace;
        match command {
            Commands::Run(args) => super::run::RunCommand::new(ws, args.clone()).execute(ui),
            Commands::Plan(args) => super::plan::PlanCommand::new(ws, args.clone()).execute(ui),
            Commands::Status(args) => {
                super::status::StatusCommand::new(ws, args.clone()).execute(ui)
            }
            Commands::History(args) => {
                super::history::HistoryCommand::new(ws, args.clone()).execute(ui)
            }
            Commands::List(args) => super::list::ListCommand::new(ws, args.clone()).execute(ui),
            Commands::Lint(args) => super::lint::LintCommand::new(ws, args.clone()).execute(ui),
            Commands::Schema => super::schema::SchemaCommand.execute(ui),
            Commands::Completions(args) => {
                super::completions::CompletionsCommand::new(args.clone()).execute(ui)
            }
        }
    }
}
