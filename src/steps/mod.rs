//! Step definitions and execution.
//!
//! - [`StepDefinition`] - an immutable, validated step
//! - [`StepRegistry`] - every declared step plus workflows and settings
//! - [`resolve_command`] - interpolate a step's command template
//! - [`StepExecutor`] - run a step with retry, timeout and output capture
//!
//! # Example
//!
//! ```
//! use gantry::steps::{StepDefinition, StepRegistry};
//!
//! let registry = StepRegistry::new(vec![
//!     StepDefinition::new("build", "docker").with_args(["build", "."]),
//!     StepDefinition::new("push", "docker").with_depends_on(["build"]),
//! ])
//! .unwrap();
//!
//! let order = registry.graph().unwrap().resolve(&["push"]).unwrap();
//! assert_eq!(order, ["build", "push"]);
//! ```

pub mod definition;
pub mod executor;
pub mod registry;
pub mod resolved;

pub use definition::{CommandTemplate, OutputCapture, RetryPolicy, StepDefinition};
pub use executor::{
    truncate_tail, ExecutionOptions, ExecutionOutcome, StepExecutor, DEFAULT_OUTPUT_LIMIT,
};
pub use registry::StepRegistry;
pub use resolved::{check_inputs, resolve_command};
