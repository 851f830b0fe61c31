//! Terminal output.
//!
//! - [`UserInterface`] trait so commands can be tested against [`MockUI`]
//! - [`TerminalUI`] for real terminals and pipes
//! - [`GantryTheme`] styles, [`ProgressSpinner`] for running steps
//!
//! # Example
//!
//! ```
//! use gantry::ui::{MockUI, UserInterface};
//!
//! let mut ui = MockUI::new();
//! ui.success("provision");
//! assert_eq!(ui.successes(), ["provision"]);
//! ```

pub mod format;
pub mod mock;
pub mod output;
pub mod spinner;
pub mod terminal;
pub mod theme;

pub use format::{format_duration, format_relative_time, Table};
pub use mock::MockUI;
pub use output::OutputMode;
pub use spinner::ProgressSpinner;
pub use terminal::{create_ui, TerminalUI};
pub use theme::{should_use_colors, GantryTheme};

use crate::runner::RunReport;

/// Everything a command prints goes through this trait.
pub trait UserInterface {
    /// Current verbosity.
    fn output_mode(&self) -> OutputMode;

    /// Plain line.
    fn message(&mut self, msg: &str);

    /// Success line.
    fn success(&mut self, msg: &str);

    /// Warning line.
    fn warning(&mut self, msg: &str);

    /// Machine-readable output (JSON, schemas, completions). Shown in every mode.
    fn data(&mut self, text: &str);

    /// Error line. Shown in every mode.
    fn error(&mut self, msg: &str);

    /// Banner at the top of a command's output.
    fn show_header(&mut self, title: &str);

    /// Start a spinner for a running step.
    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle>;

    /// Boxed command output of a failed step.
    fn show_error_block(&mut self, title: &str, output: &str);

    /// Per-step summary at the end of a run.
    fn show_run_summary(&mut self, report: &RunReport);

    /// Whether stdout is a terminal.
    fn is_interactive(&self) -> bool;
}

/// Handle for a running spinner.
pub trait SpinnerHandle {
    /// Update the spinner message.
    fn set_message(&mut self, msg: &str);

    /// Finish as successful.
    fn finish_success(&mut self, msg: &str);

    /// Finish as failed.
    fn finish_error(&mut self, msg: &str);

    /// Finish as skipped.
    fn finish_skipped(&mut self, msg: &str);
}
