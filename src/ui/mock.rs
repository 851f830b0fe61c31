//! Mock UI for tests.
//!
//! `MockUI` records every call so command handlers can be asserted on
//! without a terminal.

use std::sync::{Arc, Mutex};

use crate::runner::RunReport;

use super::{OutputMode, SpinnerHandle, UserInterface};

/// Records everything printed through it.
#[derive(Debug, Default)]
pub struct MockUI {
    mode: OutputMode,
    interactive: bool,
    messages: Vec<String>,
    successes: Vec<String>,
    warnings: Vec<String>,
    data: Vec<String>,
    errors: Vec<String>,
    headers: Vec<String>,
    spinners: Vec<String>,
    finished: Arc<Mutex<Vec<String>>>,
    error_blocks: Vec<(String, String)>,
    summaries: Vec<RunReport>,
}

impl MockUI {
    /// A mock in `Normal` mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock in the given mode.
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Pretend to be (or not be) a terminal.
    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Machine-readable output.
    pub fn data_lines(&self) -> &[String] {
        &self.data
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Messages spinners were started with.
    pub fn spinners(&self) -> &[String] {
        &self.spinners
    }

    /// How spinners finished, as `success: msg`, `error: msg` or `skipped: msg`.
    pub fn finished_spinners(&self) -> Vec<String> {
        self.finished
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Captured error blocks as (title, output).
    pub fn error_blocks(&self) -> &[(String, String)] {
        &self.error_blocks
    }

    /// Run reports shown as summaries.
    pub fn summaries(&self) -> &[RunReport] {
        &self.summaries
    }

    /// Whether any message contains `text`.
    pub fn has_message(&self, text: &str) -> bool {
        self.messages.iter().any(|m| m.contains(text))
    }

    /// Whether any error contains `text`.
    pub fn has_error(&self, text: &str) -> bool {
        self.errors.iter().any(|m| m.contains(text))
    }

    /// Whether any warning contains `text`.
    pub fn has_warning(&self, text: &str) -> bool {
        self.warnings.iter().any(|m| m.contains(text))
    }
}

impl UserInterface for MockUI {
    fn output_mode(&self) -> OutputMode {
        self.mode
    }

    fn message(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }

    fn success(&mut self, msg: &str) {
        self.successes.push(msg.to_string());
    }

    fn warning(&mut self, msg: &str) {
        self.warnings.push(msg.to_string());
    }

    fn data(&mut self, text: &str) {
        self.data.push(text.to_string());
    }

    fn error(&mut self, msg: &str) {
        self.errors.push(msg.to_string());
    }

    fn show_header(&mut self, title: &str) {
        self.headers.push(title.to_string());
    }

    fn start_spinner(&mut self, message: &str) -> Box<dyn SpinnerHandle> {
        self.spinners.push(message.to_string());
        Box::new(MockSpinner {
            finished: Arc::clone(&self.finished),
        })
    }

    fn show_error_block(&mut self, title: &str, output: &str) {
        self.error_blocks
            .push((title.to_string(), output.to_string()));
    }

    fn show_run_summary(&mut self, report: &RunReport) {
        self.summaries.push(report.clone());
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Spinner that records how it finished.
#[derive(Debug)]
pub struct MockSpinner {
    finished: Arc<Mutex<Vec<String>>>,
}

impl MockSpinner {
    fn record(&self, kind: &str, msg: &str) {
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(format!("{}: {}", kind, msg));
        }
    }
}

impl SpinnerHandle for MockSpinner {
    fn set_message(&mut self, _msg: &str) {}

    fn finish_success(&mut self, msg: &str) {
        self.record("success", msg);
    }

    fn finish_error(&mut self, msg: &str) {
        self.record("error", msg);
    }

    fn finish_skipped(&mut self, msg: &str) {
        self.record("skipped", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_messages() {
        let mut ui = MockUI::new();
        ui.message("planning");
        ui.warning("slow step");
        ui.error("push failed");

        assert!(ui.has_message("plan"));
        assert!(ui.has_warning("slow"));
        assert!(ui.has_error("push"));
        assert_eq!(ui.output_mode(), OutputMode::Normal);
    }

    #[test]
    fn records_spinner_outcomes() {
        let mut ui = MockUI::new();
        ui.start_spinner("build").finish_success("build");
        ui.start_spinner("push").finish_error("push");

        assert_eq!(ui.spinners(), ["build", "push"]);
        assert_eq!(ui.finished_spinners(), ["success: build", "error: push"]);
    }
}
