//! Execution state: runs, step results and their persistence.
//!
//! - [`Run`] / [`RunId`] / [`RunStatus`] - one orchestrated execution
//! - [`StepResult`] / [`StepStatus`] - per-step record and state machine
//! - [`ExecutionStateStore`] - durable storage, file or memory backed

pub mod memory;
pub mod result;
pub mod run;
pub mod store;

pub use memory::MemoryStateStore;
pub use result::{InvalidTransition, SkipReason, StepResult, StepStatus};
pub use run::{Run, RunId, RunStatus};
pub use store::{ExecutionStateStore, FileStateStore};
