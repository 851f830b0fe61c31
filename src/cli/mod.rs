//! Command-line interface for Gantry.
//!
//! # Architecture
//!
//! - [`args`] - Argument definitions using clap derive macros
//! - [`commands`] - Command implementations
//! - [`interrupt`] - Ctrl-C turns into run cancellation

pub mod args;
pub mod commands;
pub mod interrupt;

pub use args::{
    Cli, Commands, CompletionsArgs, HistoryArgs, LintArgs, ListArgs, PlanArgs, RunArgs,
    StatusArgs, TargetArgs,
};
pub use commands::{Command, CommandDispatcher, CommandResult, Project, Workspace};
pub use interrupt::install_interrupt_handler;
