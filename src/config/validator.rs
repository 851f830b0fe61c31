//! Configuration validation rules.
//!
//! This module validates configuration for correctness:
//! - Step names are well formed and unique
//! - Every step has a program and well-formed templates
//! - depends_on must reference existing steps, never the step itself
//! - No circular dependencies allowed
//! - `${step.output}` references point at a declared output of a dependency
//! - Workflows must reference existing steps

use crate::config::interpolation::{parse_interpolation, Segment, VariableRef};
use crate::config::schema::{GantryConfig, RetryConfig, StepConfig};
use crate::error::{GantryError, Result};
use crate::runner::DependencyGraph;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static STEP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("step name pattern is valid")
});

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Check whether `name` is usable as a step name.
pub fn is_valid_step_name(name: &str) -> bool {
    STEP_NAME.is_match(name)
}

/// Validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Rule identifier
    pub rule: String,
    /// Human-readable error message
    pub message: String,
    /// Step name if error is step-specific
    pub step: Option<String>,
    /// Workflow name if error is workflow-specific
    pub workflow: Option<String>,
}

impl ValidationError {
    fn step(rule: &str, step: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            step: Some(step.to_string()),
            workflow: None,
        }
    }

    fn workflow(rule: &str, workflow: &str, message: String) -> Self {
        Self {
            rule: rule.to_string(),
            message,
            step: None,
            workflow: Some(workflow.to_string()),
        }
    }
}

/// Validate a configuration and return all errors.
///
/// This function collects all validation errors rather than stopping
/// at the first one, allowing users to fix multiple issues at once.
pub fn validate_config(config: &GantryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_settings(config));
    errors.extend(validate_steps(config));
    errors.extend(validate_dependencies(config));
    errors.extend(validate_output_references(config));
    errors.extend(validate_workflows(config));

    errors
}

fn validate_settings(config: &GantryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.settings.max_parallel == 0 {
        errors.push(ValidationError {
            rule: "invalid-parallelism".to_string(),
            message: "settings.max_parallel must be at least 1".to_string(),
            step: None,
            workflow: None,
        });
    }

    if let Some(message) = retry_problem(&config.settings.retry) {
        errors.push(ValidationError {
            rule: "invalid-retry".to_string(),
            message: format!("settings.retry: {}", message),
            step: None,
            workflow: None,
        });
    }

    errors
}

fn retry_problem(retry: &RetryConfig) -> Option<String> {
    if retry.max_attempts == 0 {
        Some("max_attempts must be at least 1".to_string())
    } else if retry.base_delay_ms > retry.max_delay_ms {
        Some(format!(
            "base_delay_ms ({}) exceeds max_delay_ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        ))
    } else {
        None
    }
}

/// Validate step definitions.
fn validate_steps(config: &GantryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let names: HashSet<&str> = config.steps.iter().map(|s| s.name.as_str()).collect();

    for step in &config.steps {
        let name = step.name.as_str();

        if !is_valid_step_name(name) {
            errors.push(ValidationError::step(
                "invalid-step-name",
                name,
                format!(
                    "Step name '{}' must start with a letter or digit and contain only letters, digits, '_', '.' or '-'",
                    name
                ),
            ));
        }

        if !seen.insert(name) {
            errors.push(ValidationError::step(
                "duplicate-step",
                name,
                format!("Step '{}' is declared more than once", name),
            ));
        }

        if step.program.trim().is_empty() {
            errors.push(ValidationError::step(
                "missing-program",
                name,
                format!("Step '{}' must have a 'program'", name),
            ));
        }

        for template in templates(step) {
            if let Err(e) = parse_interpolation(template) {
                errors.push(ValidationError::step(
                    "invalid-template",
                    name,
                    format!("Step '{}' has an invalid template '{}': {}", name, template, e),
                ));
            }
        }

        for key in step.env.keys().chain(step.required_env.iter()) {
            if !IDENTIFIER.is_match(key) {
                errors.push(ValidationError::step(
                    "invalid-env-name",
                    name,
                    format!("Step '{}' uses invalid environment variable name '{}'", name, key),
                ));
            }
        }

        for dep in &step.depends_on {
            if dep == name {
                errors.push(ValidationError::step(
                    "self-dependency",
                    name,
                    format!("Step '{}' depends on itself", name),
                ));
            } else if !names.contains(dep.as_str()) {
                errors.push(ValidationError::step(
                    "unknown-step",
                    name,
                    format!("Step '{}' depends on '{}' which does not exist", name, dep),
                ));
            }
        }

        if let Some(message) = step.retry.as_ref().and_then(retry_problem) {
            errors.push(ValidationError::step(
                "invalid-retry",
                name,
                format!("Step '{}' retry: {}", name, message),
            ));
        }

        if step.timeout_secs == Some(0) {
            errors.push(ValidationError::step(
                "invalid-timeout",
                name,
                format!("Step '{}' timeout_secs must be greater than zero", name),
            ));
        }

        for (output, capture) in &step.outputs {
            if !IDENTIFIER.is_match(output) {
                errors.push(ValidationError::step(
                    "invalid-output-name",
                    name,
                    format!("Step '{}' declares invalid output name '{}'", name, output),
                ));
            }
            if let Some(pattern) = &capture.pattern {
                if let Err(e) = Regex::new(pattern) {
                    errors.push(ValidationError::step(
                        "invalid-output-pattern",
                        name,
                        format!("Step '{}' output '{}' has an invalid pattern: {}", name, output, e),
                    ));
                }
            }
        }
    }

    errors
}

/// Every string of a step that may contain `${...}` interpolation.
pub(crate) fn templates(step: &StepConfig) -> impl Iterator<Item = &String> {
    std::iter::once(&step.program)
        .chain(step.args.iter())
        .chain(step.env.values())
        .chain(step.cwd.iter())
}

/// Graph over the dependencies that point at declared steps.
fn known_graph(config: &GantryConfig) -> Option<DependencyGraph> {
    let names: HashSet<&str> = config.steps.iter().map(|s| s.name.as_str()).collect();

    config
        .steps
        .iter()
        .fold(DependencyGraph::builder(), |builder, step| {
            let deps = step
                .depends_on
                .iter()
                .filter(|d| names.contains(d.as_str()) && *d != &step.name)
                .cloned()
                .collect();
            builder.add_step(step.name.clone(), deps)
        })
        .build()
        .ok()
}

/// Validate step dependencies for cycles.
fn validate_dependencies(config: &GantryConfig) -> Vec<ValidationError> {
    let Some(graph) = known_graph(config) else {
        return Vec::new();
    };

    // Only report one cycle
    match graph.find_cycle() {
        Some(cycle) => vec![ValidationError::step(
            "circular-dependency",
            &cycle[0],
            format!("Circular dependency detected: {}", cycle.join(" -> ")),
        )],
        None => Vec::new(),
    }
}

/// Validate `${step.output}` references.
fn validate_output_references(config: &GantryConfig) -> Vec<ValidationError> {
    let Some(graph) = known_graph(config) else {
        return Vec::new();
    };
    let mut errors = Vec::new();

    for step in &config.steps {
        let upstream = graph.transitive_dependencies(&step.name);

        for template in templates(step) {
            let Ok(segments) = parse_interpolation(template) else {
                continue;
            };

            for segment in segments {
                let Segment::Variable(variable) = segment else {
                    continue;
                };
                let VariableRef::Output {
                    step: source,
                    output,
                } = VariableRef::parse(&variable)
                else {
                    continue;
                };

                let message = match config.step(source) {
                    None => Some(format!(
                        "Step '{}' references '${{{}}}' but step '{}' does not exist",
                        step.name, variable, source
                    )),
                    Some(_) if !upstream.contains(source) => Some(format!(
                        "Step '{}' references '${{{}}}' but does not depend on '{}'",
                        step.name, variable, source
                    )),
                    Some(source_step) if !source_step.outputs.contains_key(output) => {
                        Some(format!(
                            "Step '{}' references '${{{}}}' but '{}' declares no output '{}'",
                            step.name, variable, source, output
                        ))
                    }
                    Some(_) => None,
                };

                if let Some(message) = message {
                    errors.push(ValidationError::step("invalid-output-reference", &step.name, message));
                }
            }
        }
    }

    errors
}

/// Validate workflow definitions.
fn validate_workflows(config: &GantryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut workflows: Vec<_> = config.workflows.iter().collect();
    workflows.sort_by_key(|(name, _)| name.as_str());

    for (name, targets) in workflows {
        if config.step(name).is_some() {
            errors.push(ValidationError::workflow(
                "workflow-shadows-step",
                name,
                format!("Workflow '{}' has the same name as a step", name),
            ));
        }

        if targets.is_empty() {
            errors.push(ValidationError::workflow(
                "empty-workflow",
                name,
                format!("Workflow '{}' has no steps", name),
            ));
        }

        for step_name in targets {
            if config.step(step_name).is_none() {
                errors.push(ValidationError::workflow(
                    "unknown-workflow-step",
                    name,
                    format!(
                        "Workflow '{}' references step '{}' which does not exist",
                        name, step_name
                    ),
                ));
            }
        }
    }

    errors
}

impl From<ValidationError> for GantryError {
    fn from(error: ValidationError) -> Self {
        GantryError::ConfigValidationError {
            message: error.message,
        }
    }
}

/// Validate and return Result (for convenience).
///
/// # Errors
///
/// Returns `ConfigValidationError` if any validation rules fail.
pub fn validate(config: &GantryConfig) -> Result<()> {
    let errors = validate_config(config);

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<_> = errors.iter().map(|e| e.message.clone()).collect();
        Err(GantryError::ConfigValidationError {
            message: messages.join("; "),
        })
    }
}
