//! Run orchestration.
//!
//! - [`DependencyGraph`] - resolves targets into an execution order
//! - [`Orchestrator`] - plans and executes runs
//! - [`RunReport`] - what a run did
//! - [`CancellationToken`] - stops a run from scheduling more steps

pub mod cancel;
pub mod dependency;
pub mod orchestrator;
pub mod report;

pub use cancel::CancellationToken;
pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use orchestrator::{
    Orchestrator, OrchestratorOptions, PlannedAction, PlannedStep, RunPlan, RunProgress,
    RunRequest,
};
pub use report::{
    RunReport, StepReport, EXIT_CANCELLED, EXIT_COMPLETED, EXIT_CONFIGURATION, EXIT_FAILED,
};
