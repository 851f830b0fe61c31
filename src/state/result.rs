//! Per-step results and their state machine.

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a step did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A previous success with the same inputs exists.
    AlreadySatisfied,
    /// A prerequisite failed.
    DependencyFailed {
        /// The failed step that caused the skip.
        dependency: String,
    },
    /// The run was cancelled before the step started.
    Cancelled,
}

/// Execution state of a step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped {
        #[serde(flatten)]
        reason: SkipReason,
    },
}

impl StepStatus {
    /// Whether the step is finished for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped { .. })
    }

    /// Whether dependents may proceed past this step.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Skipped {
                    reason: SkipReason::AlreadySatisfied
                }
        )
    }

    /// Get a display character for this status.
    pub fn display_char(&self) -> char {
        match self {
            Self::Pending => '○',
            Self::Running => '◉',
            Self::Succeeded => '✓',
            Self::Failed => '✗',
            Self::Skipped { .. } => '⊘',
        }
    }

    /// Whether moving to `next` is a legal transition.
    ///
    /// Pending→Running, Pending→Skipped, Running→Succeeded,
    /// Running→Failed and Failed→Running (retry).
    pub fn can_transition_to(&self, next: &StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped { .. })
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Failed, Self::Running)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped {
                reason: SkipReason::AlreadySatisfied,
            } => f.write_str("skipped (already satisfied)"),
            Self::Skipped {
                reason: SkipReason::DependencyFailed { dependency },
            } => write!(f, "skipped ({} failed)", dependency),
            Self::Skipped {
                reason: SkipReason::Cancelled,
            } => f.write_str("skipped (cancelled)"),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition for step '{step}': {from} -> {to}")]
pub struct InvalidTransition {
    pub step: String,
    pub from: StepStatus,
    pub to: StepStatus,
}

/// Record of one step within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name.
    pub step: String,

    /// Current status.
    pub status: StepStatus,

    /// Attempts made so far.
    #[serde(default)]
    pub attempts: u32,

    /// Exit code of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Captured stdout of the last attempt (bounded, masked).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    /// Captured stderr of the last attempt (bounded, masked).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// When the first attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Input fingerprint the step ran with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Captured named outputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,

    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// A fresh `Pending` result.
    pub fn pending(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Pending,
            attempts: 0,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at: None,
            finished_at: None,
            fingerprint: None,
            outputs: BTreeMap::new(),
            failure: None,
            error: None,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    ///
    /// Entering `Running` stamps `started_at` (first time only); entering a
    /// terminal status stamps `finished_at`.
    pub fn transition(&mut self, next: StepStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(&next) {
            return Err(InvalidTransition {
                step: self.step.clone(),
                from: self.status.clone(),
                to: next,
            });
        }

        let now = Utc::now();
        match &next {
            StepStatus::Running => {
                self.started_at.get_or_insert(now);
                self.finished_at = None;
            }
            status if status.is_terminal() => self.finished_at = Some(now),
            _ => {}
        }

        self.status = next;
        Ok(())
    }

    /// Duration between start and finish in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    /// Captured output for display: stderr when present, else stdout.
    pub fn output(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped(reason: SkipReason) -> StepStatus {
        StepStatus::Skipped { reason }
    }

    #[test]
    fn forward_transitions_are_allowed() {
        let mut result = StepResult::pending("build");

        result.transition(StepStatus::Running).unwrap();
        assert!(result.started_at.is_some());
        result.transition(StepStatus::Failed).unwrap();
        assert!(result.finished_at.is_some());
        result.transition(StepStatus::Running).unwrap();
        assert!(result.finished_at.is_none());
        result.transition(StepStatus::Succeeded).unwrap();

        assert_eq!(result.status, StepStatus::Succeeded);
        assert!(result.duration_ms().is_some());
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut result = StepResult::pending("build");
        result.transition(StepStatus::Running).unwrap();
        result.transition(StepStatus::Succeeded).unwrap();

        let err = result.transition(StepStatus::Running).unwrap_err();
        assert_eq!(err.from, StepStatus::Succeeded);
        assert_eq!(result.status, StepStatus::Succeeded);

        assert!(result.transition(StepStatus::Pending).is_err());
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let mut result = StepResult::pending("build");
        assert!(result.transition(StepStatus::Succeeded).is_err());
        assert!(result.transition(StepStatus::Failed).is_err());
    }

    #[test]
    fn skipped_is_terminal() {
        let mut result = StepResult::pending("deploy");
        result.transition(skipped(SkipReason::Cancelled)).unwrap();

        assert!(result.status.is_terminal());
        assert!(result.transition(StepStatus::Running).is_err());
    }

    #[test]
    fn only_success_and_satisfied_unblock_dependents() {
        assert!(StepStatus::Succeeded.satisfies_dependents());
        assert!(skipped(SkipReason::AlreadySatisfied).satisfies_dependents());
        assert!(!skipped(SkipReason::Cancelled).satisfies_dependents());
        assert!(!StepStatus::Failed.satisfies_dependents());
    }

    #[test]
    fn status_serializes_with_reason() {
        let status = skipped(SkipReason::DependencyFailed {
            dependency: "push".to_string(),
        });

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "skipped");
        assert_eq!(json["kind"], "dependency_failed");
        assert_eq!(json["dependency"], "push");

        let back: StepStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
        assert_eq!(back.to_string(), "skipped (push failed)");
    }

    #[test]
    fn result_round_trips_through_yaml() {
        let mut result = StepResult::pending("provision");
        result.transition(StepStatus::Running).unwrap();
        result.transition(StepStatus::Succeeded).unwrap();
        result.attempts = 2;
        result.exit_code = Some(0);
        result
            .outputs
            .insert("login_server".to_string(), "acr.io".to_string());

        let yaml = serde_yaml::to_string(&result).unwrap();
        let back: StepResult = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(back, result);
    }

    #[test]
    fn output_prefers_stderr() {
        let mut result = StepResult::pending("a");
        result.stdout = "out".to_string();
        assert_eq!(result.output(), "out");
        result.stderr = "err".to_string();
        assert_eq!(result.output(), "err");
    }
}
