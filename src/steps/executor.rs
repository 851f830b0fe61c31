//! Step execution engine.
//!
//! Runs one step's command through a [`CommandRunner`], applying the
//! step's retry policy and timeout, bounding and masking captured output,
//! and extracting declared outputs.

use crate::config::interpolation::InterpolationContext;
use crate::error::FailureKind;
use crate::runner::CancellationToken;
use crate::secrets::OutputMasker;
use crate::shell::{CommandOptions, CommandResult, CommandRunner};
use crate::state::StepStatus;
use crate::steps::definition::StepDefinition;
use crate::steps::resolved::resolve_command;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound for stored stdout/stderr, in bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024;

/// Options shared by every step of a run.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Maximum bytes of stdout/stderr kept per step (tail).
    pub output_limit: usize,

    /// Base for relative working directories.
    pub project_root: PathBuf,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
            project_root: PathBuf::from("."),
        }
    }
}

/// What happened when a step was executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    /// `Succeeded` or `Failed`.
    pub status: StepStatus,

    /// Attempts made.
    pub attempts: u32,

    /// Exit code of the last attempt.
    pub exit_code: Option<i32>,

    /// Bounded, masked stdout of the last attempt.
    pub stdout: String,

    /// Bounded, masked stderr of the last attempt.
    pub stderr: String,

    /// Captured outputs (only on success).
    pub outputs: BTreeMap<String, String>,

    /// Failure classification (only on failure).
    pub failure: Option<FailureKind>,

    /// Failure description (only on failure).
    pub error: Option<String>,

    /// Total time spent, including backoff.
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub(crate) fn failed(kind: FailureKind, error: String, started: Instant) -> Self {
        Self {
            status: StepStatus::Failed,
            attempts: 0,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            outputs: BTreeMap::new(),
            failure: Some(kind),
            error: Some(error),
            duration: started.elapsed(),
        }
    }

    /// Whether the step succeeded.
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// Executes steps with retry, timeout and output handling.
#[derive(Clone)]
pub struct StepExecutor {
    runner: Arc<dyn CommandRunner>,
    masker: OutputMasker,
    options: ExecutionOptions,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("masker", &self.masker)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    /// Create an executor.
    pub fn new(runner: Arc<dyn CommandRunner>, options: ExecutionOptions) -> Self {
        Self {
            runner,
            masker: OutputMasker::new(),
            options,
        }
    }

    /// Mask these secrets in captured output.
    pub fn with_masker(mut self, masker: OutputMasker) -> Self {
        self.masker = masker;
        self
    }

    /// Run a step to completion.
    ///
    /// Template errors fail the step without any attempt. Non-zero exits,
    /// timeouts and spawn failures are retried per the step's policy;
    /// retrying stops early once `cancel` is set. A declared output that
    /// can't be captured fails the step without retry.
    pub fn execute(
        &self,
        definition: &StepDefinition,
        context: &InterpolationContext,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let step = definition.name.as_str();

        let command = match resolve_command(definition, context, &self.options.project_root) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(step, error = %e, "could not resolve command");
                return ExecutionOutcome::failed(e.kind(), e.to_string(), started);
            }
        };

        let options = CommandOptions {
            timeout: definition.timeout,
        };
        let policy = definition.retry;
        let command_line = command.display();

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(step, attempt, command = %self.masker.mask(&command_line), "starting attempt");

            let (result, error) = match self.runner.run(&command, &options) {
                Ok(result) => {
                    let error = describe_failure(&result, definition.timeout);
                    (Some(result), error)
                }
                Err(e) => (None, Some(e.to_string())),
            };

            tracing::info!(
                step,
                attempt,
                program = %command.program,
                exit_code = ?result.as_ref().and_then(|r| r.exit_code),
                duration_ms = result.as_ref().map_or(0, |r| r.duration.as_millis() as u64),
                timed_out = result.as_ref().is_some_and(|r| r.timed_out),
                "attempt finished"
            );

            let (stdout, stderr) = result
                .as_ref()
                .map(|r| (r.stdout.as_str(), r.stderr.as_str()))
                .unwrap_or_default();

            let Some(error) = error else {
                return self.finish_success(definition, attempt, stdout, stderr, started);
            };

            let outcome = ExecutionOutcome {
                status: StepStatus::Failed,
                attempts: attempt,
                exit_code: result.as_ref().and_then(|r| r.exit_code),
                stdout: self.bound(stdout),
                stderr: self.bound(stderr),
                outputs: BTreeMap::new(),
                failure: Some(FailureKind::Execution),
                error: Some(self.masker.mask(&error)),
                duration: started.elapsed(),
            };

            if attempt >= policy.max_attempts {
                tracing::warn!(step, attempts = attempt, error = %error, "step failed");
                return outcome;
            }
            if cancel.is_cancelled() {
                tracing::warn!(step, attempts = attempt, "not retrying: run cancelled");
                return outcome;
            }

            let delay = policy.delay_before_retry(attempt);
            tracing::warn!(
                step,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "attempt failed, retrying"
            );
            if cancel.wait_timeout(delay) {
                tracing::warn!(step, attempts = attempt, "not retrying: run cancelled");
                return ExecutionOutcome {
                    duration: started.elapsed(),
                    ..outcome
                };
            }
        }
    }

    fn finish_success(
        &self,
        definition: &StepDefinition,
        attempts: u32,
        stdout: &str,
        stderr: &str,
        started: Instant,
    ) -> ExecutionOutcome {
        let mut outputs = BTreeMap::new();
        let mut missing = Vec::new();

        for (name, capture) in &definition.outputs {
            match capture.capture(stdout, stderr) {
                Some(value) => {
                    outputs.insert(name.clone(), value);
                }
                None => missing.push(name.as_str()),
            }
        }

        let mut outcome = ExecutionOutcome {
            status: StepStatus::Succeeded,
            attempts,
            exit_code: Some(0),
            stdout: self.bound(stdout),
            stderr: self.bound(stderr),
            outputs,
            failure: None,
            error: None,
            duration: started.elapsed(),
        };

        if !missing.is_empty() {
            let error = format!("could not capture output(s): {}", missing.join(", "));
            tracing::warn!(step = %definition.name, error = %error, "step failed");
            outcome.status = StepStatus::Failed;
            outcome.outputs.clear();
            outcome.failure = Some(FailureKind::Execution);
            outcome.error = Some(error);
        } else {
            tracing::info!(step = %definition.name, attempts, "step succeeded");
        }

        outcome
    }

    /// Mask, then keep the tail within the output limit.
    fn bound(&self, output: &str) -> String {
        truncate_tail(&self.masker.mask(output), self.options.output_limit)
    }
}

fn describe_failure(result: &CommandResult, timeout: Option<Duration>) -> Option<String> {
    if result.success {
        None
    } else if result.timed_out {
        Some(format!(
            "timed out after {}s",
            timeout.map_or(0, |t| t.as_secs())
        ))
    } else {
        Some(match result.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        })
    }
}

/// Keep at most `limit` bytes from the end of `output`.
///
/// Cuts on a character boundary and marks the cut.
pub fn truncate_tail(output: &str, limit: usize) -> String {
    if output.len() <= limit {
        return output.to_string();
    }

    let mut start = output.len() - limit;
    while !output.is_char_boundary(start) {
        start += 1;
    }

    format!("[... {} bytes truncated]\n{}", start, &output[start..])
}
