//! Immutable step definitions.
//!
//! A [`StepDefinition`] is built once from a validated [`StepConfig`] with
//! the global settings folded in (default retry policy and timeout).

use crate::config::interpolation::{extract_variables, InterpolationContext, VariableRef};
use crate::config::schema::{OutputStream, RetryConfig, Settings, StepConfig};
use crate::error::{GantryError, Result};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A declared step: one external command plus its scheduling rules.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Unique step name.
    pub name: String,

    /// Free text shown in listings.
    pub description: Option<String>,

    /// Steps that must succeed first, in declaration order.
    pub depends_on: Vec<String>,

    /// The external invocation.
    pub command: CommandTemplate,

    /// Retry policy for failed attempts.
    pub retry: RetryPolicy,

    /// Per-attempt timeout.
    pub timeout: Option<Duration>,

    /// Named values captured from the command output.
    pub outputs: BTreeMap<String, OutputCapture>,
}

/// External command descriptor. Every string may contain `${var}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandTemplate {
    /// Program to run.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Extra environment for the child.
    pub env: BTreeMap<String, String>,
    /// Caller environment names that must be supplied.
    pub required_env: Vec<String>,
    /// Working directory, relative to the project root.
    pub cwd: Option<String>,
}

impl CommandTemplate {
    /// Every template string, in a stable order.
    pub fn templates(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .chain(self.env.values())
            .chain(self.cwd.iter())
    }
}

/// How often and how patiently a failing step is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the next attempt after `failed_attempts` failures.
    ///
    /// `min(base_delay * 2^(failed_attempts - 1), max_delay)`.
    pub fn delay_before_retry(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Rule for capturing a named output from a finished command.
#[derive(Debug, Clone)]
pub struct OutputCapture {
    /// Stream to read.
    pub stream: OutputStream,
    /// Optional extraction pattern.
    pub pattern: Option<Regex>,
}

impl OutputCapture {
    /// Extract the value from the command's output.
    ///
    /// With a pattern: capture group 1 of the first match, or the whole
    /// match when the pattern has no group. Without one: the trimmed stream.
    /// Returns `None` when nothing can be captured.
    pub fn capture(&self, stdout: &str, stderr: &str) -> Option<String> {
        let text = match self.stream {
            OutputStream::Stdout => stdout,
            OutputStream::Stderr => stderr,
        };

        match &self.pattern {
            Some(pattern) => {
                let caps = pattern.captures(text)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            }
            None => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

/// Canonical shape hashed by [`StepDefinition::fingerprint`].
#[derive(Serialize)]
struct Canonical<'a> {
    name: &'a str,
    command: &'a CommandTemplate,
    depends_on: &'a [String],
    outputs: BTreeMap<&'a str, (OutputStream, Option<&'a str>)>,
}

impl StepDefinition {
    /// Create a definition with a program and defaults for everything else.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            depends_on: Vec::new(),
            command: CommandTemplate {
                program: program.into(),
                ..Default::default()
            },
            retry: RetryPolicy::none(),
            timeout: None,
            outputs: BTreeMap::new(),
        }
    }

    /// Set the program arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the dependencies.
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Require caller environment variables.
    pub fn with_required_env<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.required_env = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declare a captured output.
    pub fn with_output(mut self, name: impl Into<String>, capture: OutputCapture) -> Self {
        self.outputs.insert(name.into(), capture);
        self
    }

    /// Build a definition from configuration.
    ///
    /// Step-level retry and timeout override `settings`.
    pub fn from_config(config: &StepConfig, settings: &Settings) -> Result<Self> {
        let mut depends_on: Vec<String> = Vec::with_capacity(config.depends_on.len());
        for dep in &config.depends_on {
            if !depends_on.contains(dep) {
                depends_on.push(dep.clone());
            }
        }

        let mut outputs = BTreeMap::new();
        for (name, output) in &config.outputs {
            let pattern = output
                .pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| GantryError::ConfigValidationError {
                    message: format!(
                        "Step '{}' output '{}' has an invalid pattern: {}",
                        config.name, name, e
                    ),
                })?;
            outputs.insert(
                name.clone(),
                OutputCapture {
                    stream: output.stream,
                    pattern,
                },
            );
        }

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            depends_on,
            command: CommandTemplate {
                program: config.program.clone(),
                args: config.args.clone(),
                env: config.env.clone(),
                required_env: config.required_env.clone(),
                cwd: config.cwd.clone(),
            },
            retry: RetryPolicy::from_config(config.retry.as_ref().unwrap_or(&settings.retry)),
            timeout: config
                .timeout_secs
                .or(settings.timeout_secs)
                .map(Duration::from_secs),
            outputs,
        })
    }

    /// SHA-256 (hex) of the definition's canonical form.
    ///
    /// Covers the command, dependencies and outputs. Description, retry
    /// policy and timeout don't change what a step does, so they are left out.
    pub fn fingerprint(&self) -> String {
        let canonical = Canonical {
            name: &self.name,
            command: &self.command,
            depends_on: &self.depends_on,
            outputs: self
                .outputs
                .iter()
                .map(|(name, capture)| {
                    (
                        name.as_str(),
                        (capture.stream, capture.pattern.as_ref().map(Regex::as_str)),
                    )
                })
                .collect(),
        };

        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Fingerprint of the definition plus the values of the caller
    /// environment and registry variables its templates reference, and of
    /// every `required_env` variable.
    ///
    /// Builtins such as `run_id` and step outputs are excluded.
    pub fn input_fingerprint(&self, context: &InterpolationContext) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.fingerprint().as_bytes());

        let mut names: BTreeSet<String> = self
            .referenced_variables()
            .into_iter()
            .filter(|name| matches!(VariableRef::parse(name), VariableRef::Plain(_)))
            .collect();
        names.extend(self.command.required_env.iter().cloned());

        for name in names {
            let value = context.env.get(&name).or_else(|| context.vars.get(&name));
            if let Some(value) = value {
                hasher.update(b"\n");
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }

        hex::encode(hasher.finalize())
    }

    /// All `${...}` names used anywhere in the command template, sorted.
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        self.command
            .templates()
            .flat_map(|t| extract_variables(t))
            .collect()
    }

    /// Steps whose outputs this definition reads.
    pub fn output_sources(&self) -> BTreeSet<String> {
        self.referenced_variables()
            .iter()
            .filter_map(|name| match VariableRef::parse(name) {
                VariableRef::Output { step, .. } => Some(step.to_string()),
                VariableRef::Plain(_) => None,
            })
            .collect()
    }
}
