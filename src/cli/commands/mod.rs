//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! Commands are dispatched via [`CommandDispatcher`]. Every command except
//! `schema` and `completions` works on a [`Workspace`]: the project root,
//! an optional config override, the environment handed to steps and the
//! cancellation token Ctrl-C sets.

pub mod completions;
pub mod dispatcher;
pub mod history;
pub mod lint;
pub mod list;
pub mod plan;
pub mod project;
pub mod run;
pub mod schema;
pub mod status;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
pub use project::{Project, Workspace};
