//! Configuration schema definitions for Gantry.
//!
//! This module contains all the struct definitions that map to
//! the YAML configuration file format.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Root configuration structure for `.gantry/config.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GantryConfig {
    /// Application name (for display purposes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// Global settings
    pub settings: Settings,

    /// Step definitions, in declaration order
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Named target sets
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub workflows: HashMap<String, Vec<String>>,
}

impl GantryConfig {
    /// Find a step by name.
    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Global settings that apply to every run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of steps executing at once
    #[serde(
        default = "default_max_parallel",
        skip_serializing_if = "is_default_max_parallel"
    )]
    pub max_parallel: usize,

    /// Directory holding execution state (relative to project root)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Maximum bytes of stdout/stderr kept per step
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,

    /// Number of runs kept in the state directory
    #[serde(
        default = "default_history_retention",
        skip_serializing_if = "is_default_history_retention"
    )]
    pub history_retention: usize,

    /// Default retry policy for steps that don't declare one
    #[serde(default)]
    pub retry: RetryConfig,

    /// Default per-attempt timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Registry variables available to command interpolation
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub vars: HashMap<String, String>,

    /// Additional environment variable names whose values are masked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_env: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            state_dir: default_state_dir(),
            output_limit: default_output_limit(),
            history_retention: default_history_retention(),
            retry: RetryConfig::default(),
            timeout_secs: None,
            vars: HashMap::new(),
            secret_env: Vec::new(),
        }
    }
}

fn default_max_parallel() -> usize {
    1
}

fn is_default_max_parallel(v: &usize) -> bool {
    *v == default_max_parallel()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gantry").join("state")
}

fn default_output_limit() -> usize {
    16 * 1024
}

fn default_history_retention() -> usize {
    50
}

fn is_default_history_retention(v: &usize) -> bool {
    *v == default_history_retention()
}

/// Retry policy as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    pub base_delay_ms: u64,

    /// Upper bound for the retry delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

/// Configuration for a single step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    /// Step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Program to execute (looked up on PATH)
    pub program: String,

    /// Program arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory (relative to project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Step-specific environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Environment variables the caller must supply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_env: Vec<String>,

    /// Steps that must succeed before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Retry policy (falls back to settings.retry)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Per-attempt timeout in seconds (falls back to settings.timeout_secs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Values captured from the command output
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, OutputConfig>,
}

/// Which stream an output is captured from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    #[default]
    Stdout,
    Stderr,
}

/// Capture rule for a named step output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    /// Stream to read
    pub stream: OutputStream,

    /// Regex applied to the stream; capture group 1 (or the whole match) is
    /// the value. Without a pattern the trimmed stream is the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}
