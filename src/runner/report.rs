//! Run reports.

use crate::error::{FailureKind, GantryError, Result};
use crate::state::{
    ExecutionStateStore, Run, RunId, RunStatus, SkipReason, StepResult, StepStatus,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Exit code of a completed run.
pub const EXIT_COMPLETED: i32 = 0;
/// Exit code of a failed run.
pub const EXIT_FAILED: i32 = 1;
/// Exit code of a run rejected for configuration problems.
pub const EXIT_CONFIGURATION: i32 = 2;
/// Exit code of a cancelled run (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// Terminal state of one step, as shown to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Step name.
    pub name: String,

    /// Final status.
    pub status: StepStatus,

    /// Attempts made in this run.
    pub attempts: u32,

    /// Exit code of the last attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Time spent running the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Failure classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Bounded captured output of a failed step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl StepReport {
    /// Summarize a stored step result.
    pub fn from_result(result: &StepResult) -> Self {
        let failure = match &result.status {
            StepStatus::Failed => result.failure.or(Some(FailureKind::Execution)),
            StepStatus::Skipped {
                reason: SkipReason::DependencyFailed { .. },
            } => Some(FailureKind::DependencyFailure),
            StepStatus::Skipped {
                reason: SkipReason::Cancelled,
            } => Some(FailureKind::Cancelled),
            _ => None,
        };

        let error = match &result.status {
            StepStatus::Skipped {
                reason: SkipReason::DependencyFailed { dependency },
            } => Some(format!("dependency '{}' did not succeed", dependency)),
            _ => result.error.clone(),
        };

        let output = (result.status == StepStatus::Failed && !result.output().is_empty())
            .then(|| result.output().to_string());

        Self {
            name: result.step.clone(),
            status: result.status.clone(),
            attempts: result.attempts,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms(),
            failure,
            error,
            output,
        }
    }
}

/// Outcome of a submitted run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,

    /// Final run status.
    pub status: RunStatus,

    /// Run this one resumed, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<RunId>,

    /// Every step of the run, in execution order.
    pub steps: Vec<StepReport>,

    /// Outputs requested by the caller, keyed `step.output`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,

    /// Wall time of the run.
    pub duration_ms: u64,
}

impl RunReport {
    /// Build a report from a finished run and its results.
    pub fn new(run: &Run, results: &[StepResult], outputs: BTreeMap<String, String>) -> Self {
        Self {
            run_id: run.id.clone(),
            status: run.status,
            resumed_from: run.resumed_from.clone(),
            steps: results.iter().map(StepReport::from_result).collect(),
            outputs,
            duration_ms: run.duration_ms().unwrap_or_default(),
        }
    }

    /// Rebuild the report of a stored run.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRun` if the store has no such run.
    pub fn load(store: &dyn ExecutionStateStore, run_id: &RunId) -> Result<Self> {
        let run = store
            .load_run(run_id)?
            .ok_or_else(|| GantryError::UnknownRun {
                run_id: run_id.to_string(),
            })?;
        let results = store.run_results(run_id)?;
        Ok(Self::new(&run, &results, BTreeMap::new()))
    }

    /// Look up a step's report.
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Whether the run completed.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed => EXIT_COMPLETED,
            RunStatus::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILED,
        }
    }

    /// Count steps by outcome: (succeeded, skipped, failed).
    pub fn counts(&self) -> (usize, usize, usize) {
        self.steps
            .iter()
            .fold((0, 0, 0), |(ok, skipped, failed), step| match step.status {
                StepStatus::Succeeded => (ok + 1, skipped, failed),
                StepStatus::Skipped { .. } => (ok, skipped + 1, failed),
                _ => (ok, skipped, failed + 1),
            })
    }

    /// One line per step: `✓ build (1 attempt, 1.2s)`.
    pub fn summary_lines(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|step| {
                let mut line = format!("{} {}", step.status.display_char(), step.name);
                let mut details = Vec::new();

                if step.attempts > 0 {
                    details.push(format!(
                        "{} attempt{}",
                        step.attempts,
                        if step.attempts == 1 { "" } else { "s" }
                    ));
                }
                if let Some(ms) = step.duration_ms.filter(|_| step.attempts > 0) {
                    details.push(format!("{:.1}s", ms as f64 / 1000.0));
                }
                if let StepStatus::Skipped { .. } = step.status {
                    details.push(step.status.to_string());
                } else if let Some(error) = &step.error {
                    details.push(error.clone());
                }

                if !details.is_empty() {
                    line.push_str(&format!(" ({})", details.join(", ")));
                }
                line
            })
            .collect()
    }
}
