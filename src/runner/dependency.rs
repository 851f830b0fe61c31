//! Dependency graph for step execution ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::{GantryError, Result};
use crate::steps::StepRegistry;

/// Represents the dependency relationships between steps.
///
/// Steps remember their declaration order; every ordering this graph
/// produces breaks ties by it so runs are reproducible.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step names in declaration order.
    steps: Vec<String>,
    /// Declaration index of each step.
    index: HashMap<String, usize>,
    /// Map of step name to its direct dependencies.
    dependencies: HashMap<String, Vec<String>>,
    /// Map of step name to steps that depend on it.
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Build the graph of every step in a registry.
    pub fn from_registry(registry: &StepRegistry) -> Result<Self> {
        registry
            .iter()
            .fold(Self::builder(), |builder, step| {
                builder.add_step(step.name.clone(), step.depends_on.clone())
            })
            .build()
    }

    /// Get the direct dependencies of a step.
    pub fn dependencies_of(&self, step: &str) -> Option<&[String]> {
        self.dependencies.get(step).map(Vec::as_slice)
    }

    /// Get steps that depend on the given step.
    pub fn dependents_of(&self, step: &str) -> Option<&[String]> {
        self.dependents.get(step).map(Vec::as_slice)
    }

    /// Check if a step exists in the graph.
    pub fn contains(&self, step: &str) -> bool {
        self.index.contains_key(step)
    }

    /// Get all step names in declaration order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Declaration index of a step.
    pub fn declaration_index(&self, step: &str) -> Option<usize> {
        self.index.get(step).copied()
    }

    /// Get the number of steps in the graph.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Compute the execution order for a set of target steps.
    ///
    /// The result holds exactly the targets and their transitive
    /// dependencies, dependencies before dependents, with unconstrained
    /// steps in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStep` for a target not in the graph and
    /// `CircularDependency` when the closure contains a cycle.
    pub fn resolve<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<String>> {
        let mut closure: HashSet<&str> = HashSet::new();
        let mut to_visit: Vec<&str> = Vec::new();

        for target in targets {
            let target = target.as_ref();
            let Some(&idx) = self.index.get(target) else {
                return Err(GantryError::UnknownStep {
                    name: target.to_string(),
                    referenced_by: None,
                });
            };
            to_visit.push(self.steps[idx].as_str());
        }

        while let Some(current) = to_visit.pop() {
            if closure.insert(current) {
                if let Some(deps) = self.dependencies.get(current) {
                    to_visit.extend(deps.iter().map(String::as_str));
                }
            }
        }

        self.order_subset(&closure)
    }

    /// Returns all steps in topological order (dependencies before dependents).
    ///
    /// Returns an error if a cycle is detected.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let all: HashSet<&str> = self.steps.iter().map(String::as_str).collect();
        self.order_subset(&all)
    }

    /// Kahn's algorithm over `subset`, ready steps taken by declaration index.
    fn order_subset(&self, subset: &HashSet<&str>) -> Result<Vec<String>> {
        // Count incoming edges inside the subset
        let mut in_degree: HashMap<&str, usize> = subset
            .iter()
            .map(|step| {
                let degree = self
                    .dependencies
                    .get(*step)
                    .map_or(0, |deps| deps.iter().filter(|d| subset.contains(d.as_str())).count());
                (*step, degree)
            })
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .filter_map(|(step, _)| self.index.get(*step).copied())
            .collect();

        let mut result = Vec::with_capacity(subset.len());

        while let Some(idx) = ready.pop_first() {
            let step = &self.steps[idx];
            result.push(step.clone());

            // Reduce in-degree for all dependents
            for dependent in self.dependents.get(step).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some(&i) = self.index.get(dependent) {
                            ready.insert(i);
                        }
                    }
                }
            }
        }

        // If we haven't processed all nodes, there's a cycle
        if result.len() != subset.len() {
            let remaining: HashSet<&str> = in_degree
                .iter()
                .filter(|(_, &d)| d > 0)
                .map(|(s, _)| *s)
                .collect();

            let cycle = self.find_cycle_within(&remaining).unwrap_or_else(|| {
                let mut names: Vec<String> = remaining.iter().map(|s| s.to_string()).collect();
                names.sort_by_key(|n| self.index.get(n).copied());
                names
            });

            return Err(GantryError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        Ok(result)
    }

    /// Find a cycle in the graph, returning the path if one exists.
    ///
    /// The path starts and ends with the same step, e.g. `[a, b, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let all: HashSet<&str> = self.steps.iter().map(String::as_str).collect();
        self.find_cycle_within(&all)
    }

    fn find_cycle_within(&self, subset: &HashSet<&str>) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        fn dfs<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            subset: &HashSet<&str>,
            state: &mut HashMap<&'a str, State>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            state.insert(node, State::Visiting);
            path.push(node);

            for dep in graph.dependencies.get(node).into_iter().flatten() {
                if !subset.contains(dep.as_str()) {
                    continue;
                }
                match state.get(dep.as_str()).copied().unwrap_or(State::Unvisited) {
                    State::Visiting => {
                        let start = path.iter().position(|s| *s == dep.as_str())?;
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    State::Unvisited => {
                        if let Some(cycle) = dfs(dep, graph, subset, state, path) {
                            return Some(cycle);
                        }
                    }
                    State::Visited => {}
                }
            }

            path.pop();
            state.insert(node, State::Visited);
            None
        }

        let mut state: HashMap<&str, State> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for step in self.steps.iter().filter(|s| subset.contains(s.as_str())) {
            if state.get(step.as_str()).is_none() {
                if let Some(cycle) = dfs(step, self, subset, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Split an execution order into levels of steps that may run together.
    ///
    /// A step's level is one past the deepest of its dependencies within
    /// `order`. Steps keep their relative position inside each level.
    pub fn parallel_groups(&self, order: &[String]) -> Vec<Vec<String>> {
        let mut level: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Vec<String>> = Vec::new();

        for step in order {
            let depth = self
                .dependencies
                .get(step)
                .into_iter()
                .flatten()
                .filter_map(|dep| level.get(dep.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);

            level.insert(step.as_str(), depth);
            if groups.len() <= depth {
                groups.resize_with(depth + 1, Vec::new);
            }
            groups[depth].push(step.clone());
        }

        groups
    }

    /// Check if a step is ready to run given completed steps.
    pub fn is_ready(&self, step: &str, completed: &HashSet<String>) -> bool {
        match self.dependencies.get(step) {
            None => true,
            Some(deps) => deps.iter().all(|d| completed.contains(d)),
        }
    }

    /// Get all transitive dependents of a step.
    ///
    /// Returns steps that depend on the given step, directly or indirectly.
    pub fn transitive_dependents(&self, step: &str) -> HashSet<String> {
        Self::walk(step, &self.dependents)
    }

    /// Get all transitive dependencies of a step.
    pub fn transitive_dependencies(&self, step: &str) -> HashSet<String> {
        Self::walk(step, &self.dependencies)
    }

    fn walk(step: &str, edges: &HashMap<String, Vec<String>>) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut to_visit = vec![step.to_string()];

        while let Some(current) = to_visit.pop() {
            for next in edges.get(&current).into_iter().flatten() {
                if result.insert(next.clone()) {
                    to_visit.push(next.clone());
                }
            }
        }

        result
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    steps: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its dependencies.
    ///
    /// Steps are ordered by when they are first added.
    pub fn add_step(mut self, name: impl Into<String>, depends_on: Vec<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains_key(&name) {
            self.steps.push(name.clone());
        }
        let deps = self.dependencies.entry(name).or_default();
        for dep in depends_on {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self
    }

    /// Build the dependency graph.
    ///
    /// Returns `UnknownStep` if any dependency references a non-existent step.
    pub fn build(self) -> Result<DependencyGraph> {
        let index: HashMap<String, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();

        let mut dependents: HashMap<String, Vec<String>> = self
            .steps
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();

        for step in &self.steps {
            for dep in self.dependencies.get(step).into_iter().flatten() {
                match dependents.get_mut(dep) {
                    Some(list) => list.push(step.clone()),
                    None => {
                        return Err(GantryError::UnknownStep {
                            name: dep.clone(),
                            referenced_by: Some(step.clone()),
                        })
                    }
                }
            }
        }

        Ok(DependencyGraph {
            steps: self.steps,
            index,
            dependencies: self.dependencies,
            dependents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn deployment_graph() -> DependencyGraph {
        DependencyGraph::builder()
            .add_step("provision", vec![])
            .add_step("build", vec![])
            .add_step("push", deps(&["build"]))
            .add_step("deploy", deps(&["push", "provision"]))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_creates_empty_graph() {
        let graph = DependencyGraph::builder().build().unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn builder_tracks_dependencies_and_dependents() {
        let graph = deployment_graph();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.dependencies_of("push").unwrap(), &["build".to_string()]);
        assert_eq!(graph.dependents_of("build").unwrap(), &["push".to_string()]);
        assert_eq!(graph.declaration_index("deploy"), Some(3));
    }

    #[test]
    fn builder_deduplicates_dependencies() {
        let graph = DependencyGraph::builder()
            .add_step("a", vec![])
            .add_step("b", deps(&["a", "a"]))
            .build()
            .unwrap();

        assert_eq!(graph.dependencies_of("b").unwrap().len(), 1);
    }

    #[test]
    fn builder_rejects_unknown_dependency() {
        let result = DependencyGraph::builder()
            .add_step("step1", deps(&["nonexistent"]))
            .build();

        match result {
            Err(GantryError::UnknownStep {
                name,
                referenced_by,
            }) => {
                assert_eq!(name, "nonexistent");
                assert_eq!(referenced_by.as_deref(), Some("step1"));
            }
            other => panic!("expected UnknownStep, got {:?}", other),
        }
    }

    #[test]
    fn resolve_deploy_uses_declaration_order() {
        let graph = deployment_graph();

        let order = graph.resolve(&["deploy"]).unwrap();

        assert_eq!(order, vec!["provision", "build", "push", "deploy"]);
    }

    #[test]
    fn resolve_returns_only_the_closure() {
        let graph = deployment_graph();

        let order = graph.resolve(&["push"]).unwrap();

        assert_eq!(order, vec!["build", "push"]);
    }

    #[test]
    fn resolve_follows_declaration_order_not_names() {
        let graph = DependencyGraph::builder()
            .add_step("zeta", vec![])
            .add_step("alpha", vec![])
            .add_step("mid", deps(&["alpha", "zeta"]))
            .build()
            .unwrap();

        assert_eq!(graph.resolve(&["mid"]).unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn resolve_multiple_targets() {
        let graph = deployment_graph();

        let order = graph.resolve(&["push", "provision"]).unwrap();

        assert_eq!(order, vec!["provision", "build", "push"]);
    }

    #[test]
    fn resolve_unknown_target_fails() {
        let graph = deployment_graph();

        let err = graph.resolve(&["destroy"]).unwrap_err();

        assert!(matches!(
            err,
            GantryError::UnknownStep { referenced_by: None, .. }
        ));
    }

    #[test]
    fn resolve_detects_cycle_in_closure() {
        let graph = DependencyGraph::builder()
            .add_step("ok", vec![])
            .add_step("a", deps(&["b"]))
            .add_step("b", deps(&["a"]))
            .build()
            .unwrap();

        let err = graph.resolve(&["a"]).unwrap_err();
        match err {
            GantryError::CircularDependency { cycle } => {
                assert!(cycle.contains("a -> b") || cycle.contains("b -> a"));
            }
            other => panic!("expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn resolve_ignores_cycles_outside_the_closure() {
        let graph = DependencyGraph::builder()
            .add_step("ok", vec![])
            .add_step("a", deps(&["b"]))
            .add_step("b", deps(&["a"]))
            .build()
            .unwrap();

        assert_eq!(graph.resolve(&["ok"]).unwrap(), vec!["ok"]);
    }

    #[test]
    fn topological_order_places_dependencies_first() {
        let graph = DependencyGraph::builder()
            .add_step("d", deps(&["b", "c"]))
            .add_step("c", deps(&["a"]))
            .add_step("b", deps(&["a"]))
            .add_step("a", vec![])
            .build()
            .unwrap();

        let order = graph.topological_order().unwrap();

        for step in graph.steps() {
            let idx = order.iter().position(|s| s == step).unwrap();
            for dep in graph.dependencies_of(step).unwrap() {
                let dep_idx = order.iter().position(|s| s == dep).unwrap();
                assert!(dep_idx < idx, "{} must precede {}", dep, step);
            }
        }
        assert_eq!(order, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn no_cycle_returns_none() {
        assert!(deployment_graph().find_cycle().is_none());
    }

    #[test]
    fn simple_cycle_returns_path() {
        let graph = DependencyGraph::builder()
            .add_step("a", deps(&["b"]))
            .add_step("b", deps(&["a"]))
            .build()
            .unwrap();

        let path = graph.find_cycle().unwrap();
        assert_eq!(path, vec!["a", "b", "a"]);
    }

    #[test]
    fn longer_cycle_returns_full_path() {
        let graph = DependencyGraph::builder()
            .add_step("a", deps(&["c"]))
            .add_step("b", deps(&["a"]))
            .add_step("c", deps(&["b"]))
            .build()
            .unwrap();

        let path = graph.find_cycle().unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn self_cycle_detected() {
        let graph = DependencyGraph::builder()
            .add_step("a", deps(&["a"]))
            .build()
            .unwrap();

        assert_eq!(graph.find_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn parallel_groups_by_level() {
        let graph = deployment_graph();
        let order = graph.resolve(&["deploy"]).unwrap();

        let groups = graph.parallel_groups(&order);

        assert_eq!(
            groups,
            vec![deps(&["provision", "build"]), deps(&["push"]), deps(&["deploy"])]
        );
    }

    #[test]
    fn parallel_groups_empty_order() {
        assert!(deployment_graph().parallel_groups(&[]).is_empty());
    }

    #[test]
    fn is_ready_checks_completed_dependencies() {
        let graph = deployment_graph();
        let mut completed = HashSet::new();

        assert!(graph.is_ready("build", &completed));
        assert!(!graph.is_ready("push", &completed));

        completed.insert("build".to_string());
        assert!(graph.is_ready("push", &completed));
    }

    #[test]
    fn transitive_dependents_indirect() {
        let graph = deployment_graph();

        let dependents = graph.transitive_dependents("build");

        assert!(dependents.contains("push"));
        assert!(dependents.contains("deploy"));
        assert!(!dependents.contains("provision"));
    }

    #[test]
    fn transitive_dependencies_indirect() {
        let graph = deployment_graph();

        let dependencies = graph.transitive_dependencies("deploy");

        assert_eq!(dependencies.len(), 3);
        assert!(graph.transitive_dependencies("build").is_empty());
    }
}
