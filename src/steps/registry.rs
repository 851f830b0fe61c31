//! The step registry: every declared step, in declaration order.

use crate::config::schema::{GantryConfig, Settings};
use crate::config::validator::validate;
use crate::error::{GantryError, Result};
use crate::runner::DependencyGraph;
use crate::steps::definition::StepDefinition;
use std::collections::HashMap;

/// Immutable collection of step definitions plus named workflows.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<StepDefinition>,
    index: HashMap<String, usize>,
    workflows: HashMap<String, Vec<String>>,
    settings: Settings,
}

impl StepRegistry {
    /// Build a registry from definitions, checking names and dependencies.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` for duplicate names, `UnknownStep`
    /// for a dependency on an undeclared step and `CircularDependency`
    /// for a cycle.
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.clone(), i).is_some() {
                return Err(GantryError::ConfigValidationError {
                    message: format!("Step '{}' is declared more than once", step.name),
                });
            }
        }

        let registry = Self {
            steps,
            index,
            workflows: HashMap::new(),
            settings: Settings::default(),
        };

        let graph = registry.graph()?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(GantryError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        Ok(registry)
    }

    /// Validate a configuration and build its registry.
    pub fn from_config(config: &GantryConfig) -> Result<Self> {
        validate(config)?;

        let steps = config
            .steps
            .iter()
            .map(|step| StepDefinition::from_config(step, &config.settings))
            .collect::<Result<Vec<_>>>()?;

        let mut registry = Self::new(steps)?;
        registry.workflows = config.workflows.clone();
        registry.settings = config.settings.clone();
        Ok(registry)
    }

    /// Attach named workflows.
    pub fn with_workflows(mut self, workflows: HashMap<String, Vec<String>>) -> Self {
        self.workflows = workflows;
        self
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Option<&StepDefinition> {
        self.index.get(name).map(|&i| &self.steps[i])
    }

    /// Check whether a step is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate steps in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps.iter()
    }

    /// Number of declared steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the registry has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Position of a step in declaration order.
    pub fn declaration_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Named workflows.
    pub fn workflows(&self) -> &HashMap<String, Vec<String>> {
        &self.workflows
    }

    /// Settings the registry was loaded with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Dependency graph over every declared step.
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::from_registry(self)
    }

    /// Expand workflow names into step names.
    ///
    /// An empty target list means the `default` workflow. Duplicates are
    /// dropped, first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStep` for a name that is neither a step nor a
    /// workflow, or when no targets are given and there is no `default`.
    pub fn expand_targets<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<String>> {
        let requested: Vec<&str> = if targets.is_empty() {
            vec!["default"]
        } else {
            targets.iter().map(AsRef::as_ref).collect()
        };

        let mut expanded: Vec<String> = Vec::new();
        for target in requested {
            let names: Vec<&str> = if self.contains(target) {
                vec![target]
            } else if let Some(workflow) = self.workflows.get(target) {
                workflow.iter().map(String::as_str).collect()
            } else {
                return Err(GantryError::UnknownStep {
                    name: target.to_string(),
                    referenced_by: None,
                });
            };

            for name in names {
                if !expanded.iter().any(|e| e == name) {
                    expanded.push(name.to_string());
                }
            }
        }

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StepConfig;

    fn registry() -> StepRegistry {
        StepRegistry::new(vec![
            StepDefinition::new("provision", "terraform"),
            StepDefinition::new("build", "docker"),
            StepDefinition::new("push", "docker").with_depends_on(["build"]),
            StepDefinition::new("deploy", "kubectl").with_depends_on(["push", "provision"]),
        ])
        .unwrap()
    }

    #[test]
    fn new_keeps_declaration_order() {
        let registry = registry();

        let names: Vec<_> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["provision", "build", "push", "deploy"]);
        assert_eq!(registry.declaration_index("push"), Some(2));
        assert_eq!(registry.get("deploy").unwrap().command.program, "kubectl");
    }

    #[test]
    fn new_rejects_duplicates() {
        let result = StepRegistry::new(vec![
            StepDefinition::new("a", "echo"),
            StepDefinition::new("a", "echo"),
        ]);

        assert!(matches!(result, Err(GantryError::ConfigValidationError { .. })));
    }

    #[test]
    fn new_rejects_unknown_dependency() {
        let result = StepRegistry::new(vec![
            StepDefinition::new("push", "docker").with_depends_on(["build"])
        ]);

        assert!(matches!(result, Err(GantryError::UnknownStep { .. })));
    }

    #[test]
    fn new_rejects_cycles() {
        let result = StepRegistry::new(vec![
            StepDefinition::new("a", "echo").with_depends_on(["b"]),
            StepDefinition::new("b", "echo").with_depends_on(["a"]),
        ]);

        assert!(matches!(result, Err(GantryError::CircularDependency { .. })));
    }

    #[test]
    fn from_config_validates() {
        let config = GantryConfig {
            steps: vec![StepConfig {
                name: "a".to_string(),
                program: String::new(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert!(matches!(
            StepRegistry::from_config(&config),
            Err(GantryError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn expand_targets_uses_default_workflow() {
        let mut workflows = HashMap::new();
        workflows.insert("default".to_string(), vec!["deploy".to_string()]);
        workflows.insert(
            "images".to_string(),
            vec!["build".to_string(), "push".to_string()],
        );
        let registry = registry().with_workflows(workflows);

        assert_eq!(registry.expand_targets::<&str>(&[]).unwrap(), vec!["deploy"]);
        assert_eq!(
            registry.expand_targets(&["images", "build", "provision"]).unwrap(),
            vec!["build", "push", "provision"]
        );
    }

    #[test]
    fn expand_targets_rejects_unknown_names() {
        let err = registry().expand_targets(&["destroy"]).unwrap_err();
        assert!(matches!(err, GantryError::UnknownStep { .. }));

        let err = registry().expand_targets::<&str>(&[]).unwrap_err();
        assert!(matches!(err, GantryError::UnknownStep { name, .. } if name == "default"));
    }
}
