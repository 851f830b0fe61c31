//! Loaded project: configuration, registry and state store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, GantryConfig};
use crate::error::Result;
use crate::runner::{CancellationToken, Orchestrator, OrchestratorOptions};
use crate::state::FileStateStore;
use crate::steps::StepRegistry;

/// Where commands run and what they are given.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    /// Project root.
    pub project_root: PathBuf,

    /// Config file replacing discovery.
    pub config: Option<PathBuf>,

    /// Environment handed to steps.
    pub env: HashMap<String, String>,

    /// Cancellation for runs.
    pub cancel: CancellationToken,
}

impl Workspace {
    /// Workspace rooted at `project_root` with an empty environment.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    /// Load configuration and build the registry.
    pub fn load(&self) -> Result<Project> {
        Project::load(&self.project_root, self.config.as_deref())
    }
}

/// A project with a validated registry.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: GantryConfig,
    pub registry: StepRegistry,
}

impl Project {
    /// Load and validate a project's configuration.
    pub fn load(root: &Path, config_override: Option<&Path>) -> Result<Self> {
        let config = load_config(root, config_override)?;
        let registry = StepRegistry::from_config(&config)?;
        tracing::debug!(root = %root.display(), steps = registry.len(), "project loaded");

        Ok(Self {
            root: root.to_path_buf(),
            config,
            registry,
        })
    }

    /// Display name for headers.
    pub fn app_name(&self) -> &str {
        self.config.app_name.as_deref().unwrap_or("project")
    }

    /// State directory, relative to the project root unless absolute.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(&self.config.settings.state_dir)
    }

    /// File store over the state directory.
    pub fn store(&self) -> Arc<FileStateStore> {
        Arc::new(FileStateStore::new(self.state_dir()))
    }

    /// Orchestrator for this project.
    pub fn orchestrator(self, cancel: CancellationToken) -> Orchestrator {
        let options = OrchestratorOptions::from_settings(&self.config.settings, &self.root);
        let store = self.store();
        Orchestrator::new(self.registry, store, options).with_cancellation(cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GantryError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loads_project_and_state_dir() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".gantry")).unwrap();
        fs::write(
            temp.path().join(".gantry/config.yml"),
            "app_name: aks\nsteps:\n  - name: build\n    program: docker\n",
        )
        .unwrap();

        let project = Workspace::new(temp.path()).load().unwrap();

        assert_eq!(project.app_name(), "aks");
        assert_eq!(project.registry.len(), 1);
        assert_eq!(project.state_dir(), temp.path().join(".gantry/state"));
    }

    #[test]
    fn missing_config_is_config_not_found() {
        let temp = TempDir::new().unwrap();
        let err = Workspace::new(temp.path()).load().unwrap_err();
        assert!(matches!(err, GantryError::ConfigNotFound { .. }));
    }
}
