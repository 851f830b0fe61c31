//! Persistent execution state.
//!
//! The [`ExecutionStateStore`] trait is the single source of truth for run
//! records and step results. [`FileStateStore`] keeps them as YAML files:
//!
//! ```text
//! <state_dir>/
//!   runs/<run_id>/run.yml
//!   runs/<run_id>/steps/<step>.yml
//!   last_success/<step>.yml
//!   last_outcome/<step>.yml
//! ```
//!
//! Every write goes to a temp file, is fsynced and then renamed into
//! place, so a result is durable once `put` returns.

use crate::error::{GantryError, Result};
use crate::state::result::{StepResult, StepStatus};
use crate::state::run::{Run, RunId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Durable storage for runs and step results.
pub trait ExecutionStateStore: Send + Sync {
    /// Result of `step` in `run_id`, if recorded.
    fn get(&self, run_id: &RunId, step: &str) -> Result<Option<StepResult>>;

    /// Record the result of `step` in `run_id`, replacing any previous one.
    ///
    /// A `Succeeded` result also becomes the step's last success; a
    /// `Succeeded` or `Failed` result becomes its last outcome.
    fn put(&self, run_id: &RunId, step: &str, result: &StepResult) -> Result<()>;

    /// Most recent `Succeeded` result of `step` across all runs.
    fn last_success(&self, step: &str) -> Result<Option<StepResult>>;

    /// Most recent executed result of `step` across all runs, whether it
    /// succeeded or failed. Skips are not recorded here.
    fn last_outcome(&self, step: &str) -> Result<Option<StepResult>>;

    /// Create or update a run record.
    fn save_run(&self, run: &Run) -> Result<()>;

    /// Load a run record.
    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>>;

    /// All runs, newest first.
    fn list_runs(&self) -> Result<Vec<Run>>;

    /// Every step result recorded for a run, in the run's order.
    fn run_results(&self, run_id: &RunId) -> Result<Vec<StepResult>>;

    /// Remove all but the newest `keep` runs. Returns how many were removed.
    fn prune(&self, keep: usize) -> Result<usize>;
}

/// YAML-file-backed [`ExecutionStateStore`].
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    /// Open (lazily creating) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    fn run_dir(&self, run_id: &RunId) -> Result<PathBuf> {
        if !RunId::is_well_formed(run_id.as_str()) {
            return Err(GantryError::UnknownRun {
                run_id: run_id.to_string(),
            });
        }
        Ok(self.runs_dir().join(run_id.as_str()))
    }

    fn step_file(&self, run_id: &RunId, step: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join("steps").join(format!("{}.yml", step)))
    }

    fn last_success_file(&self, step: &str) -> PathBuf {
        self.root.join("last_success").join(format!("{}.yml", step))
    }

    fn last_outcome_file(&self, step: &str) -> PathBuf {
        self.root.join("last_outcome").join(format!("{}.yml", step))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn store_error(path: &Path, message: impl ToString) -> GantryError {
    GantryError::StateStore {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Write `value` as YAML: temp file, fsync, rename.
fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml::to_string(value).map_err(|e| store_error(path, e))?;

    let dir = path
        .parent()
        .ok_or_else(|| store_error(path, "path has no parent directory"))?;
    fs::create_dir_all(dir).map_err(|e| store_error(dir, e))?;

    let temp_path = path.with_extension("yml.tmp");
    let mut file = File::create(&temp_path).map_err(|e| store_error(&temp_path, e))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| store_error(&temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| store_error(path, e))?;

    // Make the rename itself durable.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(())
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(store_error(path, e)),
    };

    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|e| store_error(path, e))
}

impl ExecutionStateStore for FileStateStore {
    fn get(&self, run_id: &RunId, step: &str) -> Result<Option<StepResult>> {
        let path = self.step_file(run_id, step)?;
        let _guard = self.guard();
        read_yaml(&path)
    }

    fn put(&self, run_id: &RunId, step: &str, result: &StepResult) -> Result<()> {
        let path = self.step_file(run_id, step)?;
        let _guard = self.guard();

        write_yaml(&path, result)?;
        match result.status {
            StepStatus::Succeeded => {
                write_yaml(&self.last_success_file(step), result)?;
                write_yaml(&self.last_outcome_file(step), result)?;
            }
            StepStatus::Failed => write_yaml(&self.last_outcome_file(step), result)?,
            _ => {}
        }

        tracing::debug!(run = %run_id, step, status = %result.status, "persisted step result");
        Ok(())
    }

    fn last_success(&self, step: &str) -> Result<Option<StepResult>> {
        let _guard = self.guard();
        read_yaml(&self.last_success_file(step))
    }

    fn last_outcome(&self, step: &str) -> Result<Option<StepResult>> {
        let _guard = self.guard();
        read_yaml(&self.last_outcome_file(step))
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        let path = self.run_dir(&run.id)?.join("run.yml");
        let _guard = self.guard();
        write_yaml(&path, run)
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>> {
        let path = self.run_dir(run_id)?.join("run.yml");
        let _guard = self.guard();
        read_yaml(&path)
    }

    fn list_runs(&self) -> Result<Vec<Run>> {
        let runs_dir = self.runs_dir();
        let _guard = self.guard();

        let entries = match fs::read_dir(&runs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error(&runs_dir, e)),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| store_error(&runs_dir, e))?;
            if let Some(run) = read_yaml::<Run>(&entry.path().join("run.yml"))? {
                runs.push(run);
            }
        }

        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(runs)
    }

    fn run_results(&self, run_id: &RunId) -> Result<Vec<StepResult>> {
        let Some(run) = self.load_run(run_id)? else {
            return Err(GantryError::UnknownRun {
                run_id: run_id.to_string(),
            });
        };

        let mut results = Vec::with_capacity(run.order.len());
        for step in &run.order {
            if let Some(result) = self.get(run_id, step)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    fn prune(&self, keep: usize) -> Result<usize> {
        let runs = self.list_runs()?;
        let _guard = self.guard();

        let mut removed = 0;
        for run in runs.iter().skip(keep) {
            let dir = self.run_dir(&run.id)?;
            fs::remove_dir_all(&dir).map_err(|e| store_error(&dir, e))?;
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!(removed, keep, "pruned run history");
        }
        Ok(removed)
    }
}
