//! Variable interpolation for command templates.
//!
//! Gantry supports variable interpolation in step programs, arguments,
//! environment values and working directories using `${variable}` syntax.
//!
//! # Syntax
//!
//! - `${NAME}` - caller environment, registry variable or builtin
//! - `${step.output}` - output captured from a previously succeeded step
//! - `$${escaped}` - produces literal `${escaped}` in output
//!
//! # Example
//!
//! ```yaml
//! args: [push, "${provision.login_server}/app:${IMAGE_TAG}"]
//! ```

use crate::error::{GantryError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// A segment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text
    Literal(String),
    /// Variable reference: ${name}
    Variable(String),
}

/// Problems found while parsing a template string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unterminated '${{' starting at byte {offset}")]
    Unterminated { offset: usize },
    #[error("empty variable name at byte {offset}")]
    EmptyVariable { offset: usize },
}

/// What a variable name refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableRef<'a> {
    /// `${step.output}`
    Output { step: &'a str, output: &'a str },
    /// `${NAME}`
    Plain(&'a str),
}

impl<'a> VariableRef<'a> {
    /// Classify a variable name.
    ///
    /// Output names never contain dots, so the last dot separates the step.
    pub fn parse(name: &'a str) -> Self {
        match name.rsplit_once('.') {
            Some((step, output)) if !step.is_empty() && !output.is_empty() => {
                VariableRef::Output { step, output }
            }
            _ => VariableRef::Plain(name),
        }
    }
}

/// Parse a string containing `${var}` interpolations.
///
/// Supports:
/// - `${variable_name}` - variable interpolation
/// - `$${escaped}` - literal `${escaped}` in output
pub fn parse_interpolation(input: &str) -> std::result::Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut current_literal = String::new();

    while let Some((offset, c)) = chars.next() {
        if c != '$' {
            current_literal.push(c);
            continue;
        }

        match chars.peek().map(|&(_, next)| next) {
            Some('$') => {
                chars.next();
                if chars.peek().map(|&(_, next)| next) == Some('{') {
                    // $${...} -> literal ${...}
                    chars.next();
                    current_literal.push_str("${");
                    for (_, c) in chars.by_ref() {
                        current_literal.push(c);
                        if c == '}' {
                            break;
                        }
                    }
                } else {
                    current_literal.push('$');
                }
            }
            Some('{') => {
                chars.next();

                if !current_literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut current_literal)));
                }

                let mut var_name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    var_name.push(c);
                }

                if !closed {
                    return Err(TemplateError::Unterminated { offset });
                }
                let var_name = var_name.trim().to_string();
                if var_name.is_empty() {
                    return Err(TemplateError::EmptyVariable { offset });
                }

                segments.push(Segment::Variable(var_name));
            }
            _ => current_literal.push(c),
        }
    }

    if !current_literal.is_empty() {
        segments.push(Segment::Literal(current_literal));
    }

    Ok(segments)
}

/// Extract all variable names from an interpolated string.
///
/// Malformed templates yield no variables; validation reports them separately.
pub fn extract_variables(input: &str) -> HashSet<String> {
    parse_interpolation(input)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|seg| match seg {
            Segment::Variable(name) => Some(name),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Check if a string contains any interpolation.
pub fn has_interpolation(input: &str) -> bool {
    !extract_variables(input).is_empty()
}

/// Context for variable resolution.
///
/// Variables are resolved in priority order:
/// 1. Outputs of previously succeeded steps (`${step.output}` only)
/// 2. Caller-supplied environment
/// 3. Registry variables (`settings.vars`)
/// 4. Built-in variables (lowest priority)
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Captured outputs keyed by step name
    pub outputs: HashMap<String, BTreeMap<String, String>>,

    /// Caller-supplied environment
    pub env: HashMap<String, String>,

    /// Registry variables
    pub vars: HashMap<String, String>,

    /// Built-in variables (run_id, step_name, project_root, gantry_version)
    pub builtins: HashMap<String, String>,
}

impl InterpolationContext {
    /// Create a new context with built-in variables.
    pub fn new() -> Self {
        let mut builtins = HashMap::new();
        builtins.insert(
            "gantry_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        Self {
            builtins,
            ..Default::default()
        }
    }

    /// Add caller environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add registry variables.
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Set a builtin variable.
    pub fn with_builtin(mut self, name: &str, value: impl Into<String>) -> Self {
        self.builtins.insert(name.to_string(), value.into());
        self
    }

    /// Record the outputs captured from a step.
    pub fn add_outputs(&mut self, step: &str, outputs: BTreeMap<String, String>) {
        self.outputs.insert(step.to_string(), outputs);
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, name: &str) -> Option<String> {
        match VariableRef::parse(name) {
            VariableRef::Output { step, output } => self
                .outputs
                .get(step)
                .and_then(|outputs| outputs.get(output))
                .cloned(),
            VariableRef::Plain(name) => self
                .env
                .get(name)
                .or_else(|| self.vars.get(name))
                .or_else(|| self.builtins.get(name))
                .cloned(),
        }
    }

    /// Whether a plain (non-output) variable can be resolved.
    pub fn has_plain(&self, name: &str) -> bool {
        self.env.contains_key(name) || self.vars.contains_key(name) || self.builtins.contains_key(name)
    }
}

/// Resolve all variables in an interpolated string.
///
/// # Errors
///
/// Returns `InvalidTemplate` for malformed templates and
/// `UnresolvedVariable` if any variable is not found in the context.
pub fn resolve_string(step: &str, input: &str, context: &InterpolationContext) -> Result<String> {
    let segments = parse_interpolation(input).map_err(|e| GantryError::InvalidTemplate {
        step: step.to_string(),
        message: format!("{} in '{}'", e, input),
    })?;

    let mut result = String::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Variable(name) => {
                let value =
                    context
                        .resolve(&name)
                        .ok_or_else(|| GantryError::UnresolvedVariable {
                            step: step.to_string(),
                            variable: name.clone(),
                        })?;
                result.push_str(&value);
            }
        }
    }

    Ok(result)
}
