//! Configuration loading, parsing, and validation.
//!
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Deep merging in [`merger`]
//! - Validation in [`validator`]
//! - Variable interpolation in [`interpolation`]
//!
//! # Example
//!
//! ```
//! use gantry::config::{load_merged_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! let dir = temp.path().join(".gantry");
//! fs::create_dir_all(&dir).unwrap();
//! fs::write(
//!     dir.join("config.yml"),
//!     "app_name: demo\nsteps:\n  - name: build\n    program: docker\n",
//! )
//! .unwrap();
//!
//! let config = load_merged_config(temp.path()).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.app_name, Some("demo".to_string()));
//! ```
//!
//! # Configuration File Locations
//!
//! 1. Project config (`.gantry/config.yml`)
//! 2. Local overrides (`.gantry/config.local.yml`), merged on top

pub mod interpolation;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use schema::{GantryConfig, OutputConfig, OutputStream, RetryConfig, Settings, StepConfig};

pub use loader::{
    find_project_root, load_config, load_config_file, load_config_value, load_merged_config,
    parse_config, ConfigPaths, CONFIG_DIR,
};

pub use merger::{deep_merge, merge_configs};

pub use validator::{is_valid_step_name, validate, validate_config, ValidationError};

pub use interpolation::{
    extract_variables, has_interpolation, parse_interpolation, resolve_string,
    InterpolationContext, Segment, VariableRef,
};
