//! Error types for Gantry operations.
//!
//! This module defines [`GantryError`], the primary error type used throughout
//! the crate, a [`Result`] type alias, and [`FailureKind`], the coarse
//! classification surfaced in run reports.
//!
//! # Error Handling Strategy
//!
//! - Configuration problems (cycles, unknown steps, bad templates) are fatal
//!   and surface before any external command runs
//! - Execution problems are retried by the step's retry policy and only
//!   surface once the policy is exhausted
//! - State store failures abort the run
//! - Use `anyhow::Error` (via `GantryError::Other`) for unexpected errors

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for Gantry operations.
#[derive(Debug, Error)]
pub enum GantryError {
    /// Configuration file not found at expected location.
    #[error("Configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Failed to parse configuration file.
    #[error("Failed to parse config at {path}: {message}")]
    ConfigParseError { path: PathBuf, message: String },

    /// Invalid configuration structure or values.
    #[error("Invalid configuration: {message}")]
    ConfigValidationError { message: String },

    /// A requested or referenced step is not declared.
    #[error("Unknown step '{name}'{}", referrer_suffix(.referenced_by))]
    UnknownStep {
        name: String,
        referenced_by: Option<String>,
    },

    /// Step dependency cycle detected.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// A command template could not be parsed or is structurally invalid.
    #[error("Invalid command template for step '{step}': {message}")]
    InvalidTemplate { step: String, message: String },

    /// An interpolation variable has no value in any source.
    #[error("Unresolved variable '${{{variable}}}' in step '{step}'")]
    UnresolvedVariable { step: String, variable: String },

    /// A step's required environment variable was not supplied.
    #[error("Step '{step}' requires environment variable '{variable}'")]
    MissingEnv { step: String, variable: String },

    /// The requested run does not exist in the state store.
    #[error("Unknown run: {run_id}")]
    UnknownRun { run_id: String },

    /// Step execution failed.
    #[error("Step '{step}' failed: {message}")]
    StepExecutionError { step: String, message: String },

    /// External command failed.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// External command exceeded its timeout and was killed.
    #[error("Command timed out after {seconds}s: {command}")]
    CommandTimedOut { command: String, seconds: u64 },

    /// Reading or writing execution state failed.
    #[error("State store error at {path}: {message}")]
    StateStore { path: PathBuf, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GantryError {
    /// Classify this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            GantryError::ConfigNotFound { .. }
            | GantryError::ConfigParseError { .. }
            | GantryError::ConfigValidationError { .. }
            | GantryError::UnknownStep { .. }
            | GantryError::CircularDependency { .. }
            | GantryError::InvalidTemplate { .. }
            | GantryError::UnresolvedVariable { .. }
            | GantryError::MissingEnv { .. }
            | GantryError::UnknownRun { .. } => FailureKind::Configuration,
            GantryError::StepExecutionError { .. }
            | GantryError::CommandFailed { .. }
            | GantryError::CommandTimedOut { .. } => FailureKind::Execution,
            GantryError::StateStore { .. } => FailureKind::StateStore,
            GantryError::Io(_) | GantryError::Other(_) => FailureKind::Execution,
        }
    }

    /// Whether this error is a configuration error (fatal, never retried).
    pub fn is_configuration(&self) -> bool {
        self.kind() == FailureKind::Configuration
    }
}

/// Coarse failure classification shown in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed registry, template or request.
    Configuration,
    /// External command exited non-zero, timed out or could not start.
    Execution,
    /// A prerequisite step did not succeed.
    DependencyFailure,
    /// Persisting execution state failed.
    StateStore,
    /// The run was cancelled before the step started.
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Execution => "execution",
            FailureKind::DependencyFailure => "dependency failure",
            FailureKind::StateStore => "state store",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

fn referrer_suffix(referenced_by: &Option<String>) -> String {
    referenced_by
        .as_ref()
        .map(|r| format!(" (referenced by '{}')", r))
        .unwrap_or_default()
}

/// Result type alias for Gantry operations.
pub type Result<T> = std::result::Result<T, GantryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_displays_path() {
        let err = GantryError::ConfigNotFound {
            path: PathBuf::from("/foo/config.yml"),
        };
        assert!(err.to_string().contains("/foo/config.yml"));
    }

    #[test]
    fn unknown_step_mentions_referrer() {
        let err = GantryError::UnknownStep {
            name: "pussh".into(),
            referenced_by: Some("deploy".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("pussh"));
        assert!(msg.contains("deploy"));
    }

    #[test]
    fn unknown_step_without_referrer() {
        let err = GantryError::UnknownStep {
            name: "nope".into(),
            referenced_by: None,
        };
        assert_eq!(err.to_string(), "Unknown step 'nope'");
    }

    #[test]
    fn circular_dependency_displays_cycle() {
        let err = GantryError::CircularDependency {
            cycle: "a -> b -> a".into(),
        };
        assert!(err.to_string().contains("a -> b -> a"));
    }

    #[test]
    fn unresolved_variable_displays_braces() {
        let err = GantryError::UnresolvedVariable {
            step: "push".into(),
            variable: "registry".into(),
        };
        assert!(err.to_string().contains("${registry}"));
    }

    #[test]
    fn configuration_errors_classified() {
        let errors = vec![
            GantryError::CircularDependency { cycle: "a".into() },
            GantryError::UnknownStep {
                name: "x".into(),
                referenced_by: None,
            },
            GantryError::InvalidTemplate {
                step: "s".into(),
                message: "empty program".into(),
            },
            GantryError::MissingEnv {
                step: "s".into(),
                variable: "V".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), FailureKind::Configuration, "{}", err);
            assert!(err.is_configuration());
        }
    }

    #[test]
    fn execution_and_state_errors_classified() {
        let exec = GantryError::CommandTimedOut {
            command: "terraform apply".into(),
            seconds: 5,
        };
        assert_eq!(exec.kind(), FailureKind::Execution);

        let state = GantryError::StateStore {
            path: PathBuf::from("/state"),
            message: "disk full".into(),
        };
        assert_eq!(state.kind(), FailureKind::StateStore);
        assert!(!state.is_configuration());
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: GantryError = io_err.into();
        assert!(matches!(err, GantryError::Io(_)));
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::DependencyFailure).unwrap();
        assert_eq!(json, "\"dependency_failure\"");
    }
}
