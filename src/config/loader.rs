//! Configuration file discovery and loading.
//!
//! This module handles finding and loading configuration files from
//! the project directory in the correct priority order.

use crate::config::merger::merge_configs;
use crate::config::schema::GantryConfig;
use crate::error::{GantryError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".gantry";

/// Paths to configuration files in priority order (later overrides earlier).
///
/// Merge order:
/// 1. Project config (`.gantry/config.yml`)
/// 2. Local overrides (`.gantry/config.local.yml`)
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Project config: .gantry/config.yml
    pub project: Option<PathBuf>,

    /// Local overrides: .gantry/config.local.yml
    pub project_local: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover config files for the given project root.
    pub fn discover(project_root: &Path) -> Self {
        Self {
            project: existing(project_root.join(CONFIG_DIR).join("config.yml")),
            project_local: existing(project_root.join(CONFIG_DIR).join("config.local.yml")),
        }
    }

    /// Returns all existing config paths in merge order.
    pub fn all_existing(&self) -> Vec<&PathBuf> {
        self.project.iter().chain(self.project_local.iter()).collect()
    }

    /// Check if any project config exists.
    pub fn has_project_config(&self) -> bool {
        self.project.is_some()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

/// Find the project root by walking up from `start`.
///
/// Looks for a `.gantry` directory first, falling back to `.git`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(CONFIG_DIR).is_dir() {
            return Some(current);
        }

        if current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load a single config file and parse it into [`GantryConfig`].
///
/// # Errors
///
/// Returns `ConfigNotFound` if the file doesn't exist.
/// Returns `ConfigParseError` if the YAML is invalid.
pub fn load_config_file(path: &Path) -> Result<GantryConfig> {
    let value = load_config_value(path)?;
    serde_yaml::from_value(value).map_err(|e| GantryError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse YAML content into [`GantryConfig`].
pub fn parse_config(content: &str, source_path: &Path) -> Result<GantryConfig> {
    serde_yaml::from_str(content).map_err(|e| GantryError::ConfigParseError {
        path: source_path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load a config file as a raw YAML value (for merging).
pub fn load_config_value(path: &Path) -> Result<serde_yaml::Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            GantryError::ConfigNotFound {
                path: path.to_path_buf(),
            }
        } else {
            GantryError::Io(e)
        }
    })?;

    // An empty file is an empty mapping, not null.
    if content.trim().is_empty() {
        return Ok(serde_yaml::Value::Mapping(Default::default()));
    }

    serde_yaml::from_str(&content).map_err(|e| GantryError::ConfigParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load and merge all config files for a project.
///
/// # Errors
///
/// Returns `ConfigNotFound` if no project config exists.
/// Returns `ConfigParseError` if any config file is invalid.
pub fn load_merged_config(project_root: &Path) -> Result<GantryConfig> {
    let paths = ConfigPaths::discover(project_root);
    let project_path = project_root.join(CONFIG_DIR).join("config.yml");

    if !paths.has_project_config() {
        return Err(GantryError::ConfigNotFound { path: project_path });
    }

    let configs = paths
        .all_existing()
        .into_iter()
        .map(|p| load_config_value(p))
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_configs(&configs);

    serde_yaml::from_value(merged).map_err(|e| GantryError::ConfigParseError {
        path: project_path,
        message: format!("Failed to parse merged config: {}", e),
    })
}

/// Load config with optional path override.
///
/// If `config_override` is provided, loads only that file without merging.
/// Otherwise, discovers and merges all config files.
pub fn load_config(project_root: &Path, config_override: Option<&Path>) -> Result<GantryConfig> {
    match config_override {
        Some(path) => load_config_file(path),
        None => load_merged_config(project_root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(root: &Path, name: &str, content: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn discover_finds_project_and_local() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "config.yml", "app_name: test");
        write_config(temp.path(), "config.local.yml", "");

        let paths = ConfigPaths::discover(temp.path());
        assert!(paths.has_project_config());
        assert!(paths.project_local.is_some());
        assert_eq!(paths.all_existing().len(), 2);
    }

    #[test]
    fn discover_returns_none_for_missing_configs() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::discover(temp.path());
        assert!(!paths.has_project_config());
        assert!(paths.all_existing().is_empty());
    }

    #[test]
    fn find_project_root_walks_up() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("infra").join("modules");
        fs::create_dir_all(&subdir).unwrap();
        fs::create_dir_all(temp.path().join(CONFIG_DIR)).unwrap();

        assert_eq!(find_project_root(&subdir), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn find_project_root_falls_back_to_git() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("src");
        fs::create_dir_all(&subdir).unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();

        assert_eq!(find_project_root(&subdir), Some(temp.path().to_path_buf()));
    }

    #[test]
    fn load_merged_config_requires_project_config() {
        let temp = TempDir::new().unwrap();
        let result = load_merged_config(temp.path());
        assert!(matches!(result, Err(GantryError::ConfigNotFound { .. })));
    }

    #[test]
    fn load_merged_config_applies_local_overrides() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "config.yml",
            r#"
app_name: demo
settings:
  max_parallel: 1
steps:
  - name: provision
    program: terraform
    args: [apply]
"#,
        );
        write_config(
            temp.path(),
            "config.local.yml",
            r#"
settings:
  max_parallel: 3
steps:
  - name: provision
    args: [plan]
"#,
        );

        let config = load_merged_config(temp.path()).unwrap();
        assert_eq!(config.app_name.as_deref(), Some("demo"));
        assert_eq!(config.settings.max_parallel, 3);
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.steps[0].program, "terraform");
        assert_eq!(config.steps[0].args, vec!["plan"]);
    }

    #[test]
    fn load_config_file_reports_parse_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "steps: [[[").unwrap();

        let result = load_config_file(&path);
        assert!(matches!(result, Err(GantryError::ConfigParseError { .. })));
    }

    #[test]
    fn load_config_override_skips_discovery() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yml");
        fs::write(&path, "app_name: custom").unwrap();

        let config = load_config(temp.path(), Some(&path)).unwrap();
        assert_eq!(config.app_name.as_deref(), Some("custom"));
    }

    #[test]
    fn empty_file_is_empty_config() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "config.yml", "");

        let config = load_merged_config(temp.path()).unwrap();
        assert!(config.steps.is_empty());
    }
}
