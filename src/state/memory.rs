//! In-memory execution state, for planning and tests.

use crate::error::{GantryError, Result};
use crate::state::result::{StepResult, StepStatus};
use crate::state::run::{Run, RunId};
use crate::state::store::ExecutionStateStore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<(RunId, String), StepResult>,
    last_success: HashMap<String, StepResult>,
    last_outcome: HashMap<String, StepResult>,
    runs: HashMap<RunId, Run>,
}

/// Mutex-protected [`ExecutionStateStore`] that forgets everything on drop.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<Inner>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a last-success record, as if an earlier run had succeeded.
    pub fn seed_last_success(&self, result: StepResult) {
        let mut inner = self.lock();
        inner
            .last_outcome
            .insert(result.step.clone(), result.clone());
        inner.last_success.insert(result.step.clone(), result);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ExecutionStateStore for MemoryStateStore {
    fn get(&self, run_id: &RunId, step: &str) -> Result<Option<StepResult>> {
        Ok(self
            .lock()
            .results
            .get(&(run_id.clone(), step.to_string()))
            .cloned())
    }

    fn put(&self, run_id: &RunId, step: &str, result: &StepResult) -> Result<()> {
        let mut inner = self.lock();
        inner
            .results
            .insert((run_id.clone(), step.to_string()), result.clone());
        match result.status {
            StepStatus::Succeeded => {
                inner.last_success.insert(step.to_string(), result.clone());
                inner.last_outcome.insert(step.to_string(), result.clone());
            }
            StepStatus::Failed => {
                inner.last_outcome.insert(step.to_string(), result.clone());
            }
            _ => {}
        }
        Ok(())
    }

    fn last_success(&self, step: &str) -> Result<Option<StepResult>> {
        Ok(self.lock().last_success.get(step).cloned())
    }

    fn last_outcome(&self, step: &str) -> Result<Option<StepResult>> {
        Ok(self.lock().last_outcome.get(step).cloned())
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        self.lock().runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>> {
        Ok(self.lock().runs.get(run_id).cloned())
    }

    fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.lock().runs.values().cloned().collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(runs)
    }

    fn run_results(&self, run_id: &RunId) -> Result<Vec<StepResult>> {
        let inner = self.lock();
        let run = inner.runs.get(run_id).ok_or_else(|| GantryError::UnknownRun {
            run_id: run_id.to_string(),
        })?;

        Ok(run
            .order
            .iter()
            .filter_map(|step| inner.results.get(&(run_id.clone(), step.clone())).cloned())
            .collect())
    }

    fn prune(&self, keep: usize) -> Result<usize> {
        let stale: Vec<RunId> = self
            .list_runs()?
            .into_iter()
            .skip(keep)
            .map(|run| run.id)
            .collect();

        let mut inner = self.lock();
        for id in &stale {
            inner.runs.remove(id);
            inner.results.retain(|(run_id, _), _| run_id != id);
        }
        Ok(stale.len())
    }
}
