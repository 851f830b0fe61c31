//! Terminal UI.

use console::Term;
use std::io::Write;
use std::time::Duration;

use crate::runner::RunReport;
use crate::state::StepStatus;

use super::format::format_duration;
use super::{GantryTheme, OutputMode, ProgressSpinner, SpinnerHandle, UserInterface};

/// UI writing to stdout, with errors on stderr.
///
/// Spinners are only drawn when stdout is a terminal.
pub struct TerminalUI {
    out: Term,
    err: Term,
    theme: GantryTheme,
    mode: OutputMode,
}

impl TerminalUI {
    /// Create a terminal UI.
    pub fn new(mode: OutputMode, no_color: bool) -> Self {
        Self {
            out: Term::stdout(),
            err: Term::stderr(),
            theme: GantryTheme::detect(no_color),
            mode,
        }
    }

    fn line(&mut self, text: &str) {
        if self.mode.shows_status() {
            writeln!(self.out, "{}", text).ok();
        }
    }
}

impl UserInterface for TerminalUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.line(msg);
    }

    fn success(&mut self, msg: &str) {
        let text = self.theme.format_success(msg);
        self.line(&text);
    }

    fn warning(&mut self, msg: &str) {
        let text = self.theme.format_warning(msg);
        self.line(&text);
    }

    fn data(&mut self, text: &str) {
        writeln!(self.out, "{}", text).ok();
    }

    fn error(&mut self, msg: &str) {
        writeln!(self.err, "{}", self.theme.format_error(msg)).ok();
    }

    fn show_header(&mut self, title: &str) {
        let text = format!("\n{}\n", self.theme.format_header(title));
        self.line(&text);
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        if self.mode.shows_spinners() && self.out.is_term() {
            Box::new(ProgressSpinner::new(message, self.theme.clone()))
        } else {
            Box::new(LineSpinner {
                out: self.out.clone(),
                theme: self.theme.clone(),
                enabled: self.mode.shows_status(),
            })
        }
    }

    fn show_error_block(&mut self, title: &str, output: &str) {
        let b = &self.theme.border;
        writeln!(self.err, "    {} {}", b.apply_to("┌─"), b.apply_to(title)).ok();
        for line in output.lines() {
            writeln!(self.err, "    {} {}", b.apply_to("│"), line).ok();
        }
        writeln!(self.err, "    {}", b.apply_to("└─")).ok();
    }

    fn show_run_summary(&mut self, report: &RunReport) {
        if !self.mode.shows_status() {
            return;
        }

        writeln!(self.out).ok();
        for step in &report.steps {
            let detail = match &step.status {
                StepStatus::Skipped { .. } => self.theme.dim.apply_to(step.status.to_string()),
                _ => self.theme.duration.apply_to(
                    step.duration_ms
                        .map(|ms| format_duration(Duration::from_millis(ms)))
                        .unwrap_or_default(),
                ),
            };
            writeln!(
                self.out,
                "  {} {:<24} {}",
                self.theme.status_icon(&step.status),
                step.name,
                detail
            )
            .ok();
        }

        let (succeeded, skipped, failed) = report.counts();
        writeln!(
            self.out,
            "\n  {} {} · {} succeeded · {} skipped · {} failed · {}",
            self.theme.highlight.apply_to(report.status.to_string()),
            self.theme.dim.apply_to(report.run_id.as_str()),
            succeeded,
            skipped,
            failed,
            self.theme
                .duration
                .apply_to(format_duration(Duration::from_millis(report.duration_ms))),
        )
        .ok();
    }

    fn is_interactive(&self) -> bool {
        self.out.is_term()
    }
}

/// Spinner replacement for pipes: prints one line when finished.
struct LineSpinner {
    out: Term,
    theme: GantryTheme,
    enabled: bool,
}

impl LineSpinner {
    fn print(&self, line: String) {
        if self.enabled {
            writeln!(&self.out, "{}", line).ok();
        }
    }
}

impl SpinnerHandle for LineSpinner {
    fn set_message(&mut self, _msg: &str) {}

    fn finish_success(&mut self, msg: &str) {
        self.print(self.theme.format_success(msg));
    }

    fn finish_error(&mut self, msg: &str) {
        self.print(self.theme.format_error(msg));
    }

    fn finish_skipped(&mut self, msg: &str) {
        self.print(self.theme.format_skipped(msg));
    }
}

/// Create the UI for this process.
pub fn create_ui(mode: OutputMode, no_color: bool) -> Box<dyn UserInterface> {
    Box::new(TerminalUI::new(mode, no_color))
}
