//! Gantry - declarative step orchestration.
//!
//! Gantry runs named steps (provision, build, push, deploy, ...) declared in
//! `.gantry/config.yml`. It orders them by their dependencies, threads the
//! outputs of one step into the commands of the next, retries flaky
//! commands, and records every result so a later run skips work that is
//! already done.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration loading, parsing, validation and interpolation
//! - [`error`] - Error types and result aliases
//! - [`runner`] - Dependency resolution and run orchestration
//! - [`secrets`] - Secret detection and output masking
//! - [`shell`] - External command execution
//! - [`state`] - Runs, step results and their persistence
//! - [`steps`] - Step definitions, command resolution and execution
//! - [`ui`] - Spinners, tables and terminal output
//!
//! # Example
//!
//! ```
//! use gantry::config::{resolve_string, InterpolationContext};
//! use std::collections::BTreeMap;
//!
//! let mut ctx = InterpolationContext::new();
//! ctx.add_outputs(
//!     "provision",
//!     BTreeMap::from([("login_server".to_string(), "acr.example.io".to_string())]),
//! );
//!
//! let image = resolve_string("push", "${provision.login_server}/app", &ctx).unwrap();
//! assert_eq!(image, "acr.example.io/app");
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod secrets;
pub mod shell;
pub mod state;
pub mod steps;
pub mod ui;

pub use error::{FailureKind, GantryError, Result};
