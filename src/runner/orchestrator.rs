//! Run orchestration.
//!
//! A run moves through `Planning` (targets, order, input checks and the
//! idempotent-skip decision) and `Executing` (a bounded worker pool that
//! dispatches steps once their dependencies are satisfied) before ending
//! `Completed`, `Failed` or `Cancelled`.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::config::interpolation::{InterpolationContext, VariableRef};
use crate::config::schema::Settings;
use crate::error::{FailureKind, GantryError, Result};
use crate::secrets::{OutputMasker, SecretMatcher};
use crate::shell::{CommandRunner, ProcessRunner};
use crate::state::{
    ExecutionStateStore, Run, RunId, RunStatus, SkipReason, StepResult, StepStatus,
};
use crate::steps::definition::StepDefinition;
use crate::steps::executor::{ExecutionOptions, ExecutionOutcome, StepExecutor};
use crate::steps::registry::StepRegistry;
use crate::steps::resolved::check_inputs;

use super::cancel::CancellationToken;
use super::dependency::DependencyGraph;
use super::report::RunReport;

/// Run-wide tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Worker pool width.
    pub max_parallel: usize,

    /// Bytes of stdout/stderr kept per step.
    pub output_limit: usize,

    /// Base for step working directories; exposed as `${project_root}`.
    pub project_root: PathBuf,

    /// Runs kept in history after each run.
    pub history_retention: usize,

    /// Extra env names whose values are masked.
    pub secret_env: Vec<String>,
}

impl OrchestratorOptions {
    /// Take the tuning from configuration settings.
    pub fn from_settings(settings: &Settings, project_root: impl Into<PathBuf>) -> Self {
        Self {
            max_parallel: settings.max_parallel.max(1),
            output_limit: settings.output_limit,
            project_root: project_root.into(),
            history_retention: settings.history_retention,
            secret_env: settings.secret_env.clone(),
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), ".")
    }
}

/// A request to run a set of targets.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Step or workflow names. Empty means the `default` workflow.
    pub targets: Vec<String>,

    /// Environment handed to every step.
    pub env: HashMap<String, String>,

    /// Steps to execute even if already satisfied.
    pub force: Vec<String>,

    /// Execute every step regardless of prior results.
    pub force_all: bool,

    /// Resume this earlier run.
    pub resume: Option<RunId>,

    /// Outputs to include in the report, as `step.output`.
    pub requested_outputs: Vec<String>,

    /// Override the worker pool width.
    pub max_parallel: Option<usize>,
}

impl RunRequest {
    /// Request the given targets.
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the step environment.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Add one environment value.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Force a step to execute.
    pub fn force(mut self, step: impl Into<String>) -> Self {
        self.force.push(step.into());
        self
    }

    /// Force every step to execute.
    pub fn force_all(mut self) -> Self {
        self.force_all = true;
        self
    }

    /// Resume an earlier run.
    pub fn resume(mut self, run_id: RunId) -> Self {
        self.resume = Some(run_id);
        self
    }

    /// Include `step.output` in the report.
    pub fn request_output(mut self, output: impl Into<String>) -> Self {
        self.requested_outputs.push(output.into());
        self
    }

    /// Override the worker pool width.
    pub fn with_max_parallel(mut self, width: usize) -> Self {
        self.max_parallel = Some(width);
        self
    }
}

/// Progress events emitted while a run executes.
#[derive(Debug)]
pub enum RunProgress<'a> {
    /// Planning finished.
    Planned {
        run_id: &'a RunId,
        order: &'a [String],
    },
    /// A step will not run.
    StepSkipped {
        name: &'a str,
        reason: &'a SkipReason,
    },
    /// A step is about to start.
    StepStarting {
        name: &'a str,
        index: usize,
        total: usize,
    },
    /// A step finished.
    StepFinished {
        name: &'a str,
        result: &'a StepResult,
    },
}

/// What planning decided for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    /// The step will run.
    Execute,
    /// A prior success with the same inputs exists.
    Skip,
}

/// One step of a [`RunPlan`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub action: PlannedAction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// What a run would do, without doing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlan {
    /// Targets after workflow expansion.
    pub targets: Vec<String>,
    /// Execution order.
    pub order: Vec<String>,
    /// Steps grouped by dependency level.
    pub groups: Vec<Vec<String>>,
    /// Per-step decisions, in execution order.
    pub steps: Vec<PlannedStep>,
}

impl RunPlan {
    /// Number of steps that would execute.
    pub fn execute_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == PlannedAction::Execute)
            .count()
    }
}

enum Decision {
    Execute { fingerprint: String },
    Skip { prior: StepResult },
}

/// Result of the planning phase.
struct Planned {
    targets: Vec<String>,
    order: Vec<String>,
    context: InterpolationContext,
    decisions: Vec<Decision>,
}

/// Drives runs over a step registry.
pub struct Orchestrator {
    registry: StepRegistry,
    store: Arc<dyn ExecutionStateStore>,
    runner: Arc<dyn CommandRunner>,
    options: OrchestratorOptions,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator that runs commands as child processes.
    pub fn new(
        registry: StepRegistry,
        store: Arc<dyn ExecutionStateStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            registry,
            store,
            runner: Arc::new(ProcessRunner),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a different command runner.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Observe this token for cancellation.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The step registry.
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// The state store.
    pub fn store(&self) -> &Arc<dyn ExecutionStateStore> {
        &self.store
    }

    /// Execute a run to completion.
    ///
    /// # Errors
    ///
    /// Configuration problems (unknown steps, cycles, missing env,
    /// unresolvable variables) are returned before any command runs.
    /// A state store failure aborts the run and marks its record `Failed`;
    /// the orchestrator's own token is left untouched. Step failures are not errors:
    /// they are reported in the returned [`RunReport`].
    pub fn submit_run(&self, request: RunRequest) -> Result<RunReport> {
        self.submit_run_with_progress(request, |_| {})
    }

    /// Execute a run, reporting progress to `on_progress`.
    pub fn submit_run_with_progress(
        &self,
        request: RunRequest,
        mut on_progress: impl FnMut(RunProgress<'_>),
    ) -> Result<RunReport> {
        let started = Instant::now();
        let graph = self.registry.graph()?;

        let mut run = Run::new(Vec::new());
        run.resumed_from = request.resume.clone();

        let Planned {
            targets,
            order,
            mut context,
            decisions,
        } = self.prepare(&request, &graph, &run.id)?;

        run.targets = targets;
        run.order = order.clone();
        self.store.save_run(&run)?;

        tracing::info!(
            run_id = %run.id,
            targets = ?run.targets,
            order = ?run.order,
            resumed_from = ?run.resumed_from,
            "run planned"
        );
        on_progress(RunProgress::Planned {
            run_id: &run.id,
            order: &run.order,
        });

        let mut results = Vec::with_capacity(order.len());
        for (name, decision) in order.iter().zip(decisions) {
            let mut result = StepResult::pending(name);
            match decision {
                Decision::Execute { fingerprint } => {
                    result.fingerprint = Some(fingerprint);
                }
                Decision::Skip { prior } => {
                    let reason = SkipReason::AlreadySatisfied;
                    result.fingerprint = prior.fingerprint;
                    result.outputs = prior.outputs;
                    advance(&mut result, StepStatus::Skipped { reason })?;
                    tracing::info!(run_id = %run.id, step = %name, "step already satisfied");
                }
            }
            self.store.put(&run.id, name, &result)?;
            if let StepStatus::Skipped { reason } = &result.status {
                on_progress(RunProgress::StepSkipped { name, reason });
            }
            results.push(result);
        }

        run.status = RunStatus::Executing;
        self.store.save_run(&run)?;

        let width = request
            .max_parallel
            .unwrap_or(self.options.max_parallel)
            .max(1);
        let executor = self.executor(&request);

        if let Err(e) = self.execute(
            &run.id,
            &graph,
            &executor,
            width,
            &mut results,
            &mut context,
            &mut on_progress,
        ) {
            tracing::error!(run_id = %run.id, error = %e, "run aborted");
            run.finish(RunStatus::Failed);
            if let Err(save) = self.store.save_run(&run) {
                tracing::warn!(run_id = %run.id, error = %save, "could not record aborted run");
            }
            return Err(e);
        }

        let status = if results.iter().any(|r| r.status == StepStatus::Failed) {
            RunStatus::Failed
        } else if results.iter().all(|r| r.status.satisfies_dependents()) {
            RunStatus::Completed
        } else {
            RunStatus::Cancelled
        };
        run.finish(status);
        self.store.save_run(&run)?;

        tracing::info!(
            run_id = %run.id,
            status = %status,
            duration_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );

        match self.store.prune(self.options.history_retention) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "pruned run history"),
            Err(e) => tracing::warn!(error = %e, "could not prune run history"),
        }

        let outputs = request
            .requested_outputs
            .iter()
            .filter_map(|key| context.resolve(key).map(|value| (key.clone(), value)))
            .collect();

        Ok(RunReport::new(&run, &results, outputs))
    }

    /// Plan a run without executing or persisting anything.
    pub fn plan(&self, request: &RunRequest) -> Result<RunPlan> {
        let graph = self.registry.graph()?;
        let planned = self.prepare(request, &graph, &RunId::generate())?;

        let steps = planned
            .order
            .iter()
            .zip(&planned.decisions)
            .filter_map(|(name, decision)| {
                let definition = self.registry.get(name)?;
                Some(PlannedStep {
                    name: name.clone(),
                    action: match decision {
                        Decision::Execute { .. } => PlannedAction::Execute,
                        Decision::Skip { .. } => PlannedAction::Skip,
                    },
                    depends_on: definition.depends_on.clone(),
                    description: definition.description.clone(),
                })
            })
            .collect();

        Ok(RunPlan {
            groups: graph.parallel_groups(&planned.order),
            targets: planned.targets,
            order: planned.order,
            steps,
        })
    }

    /// Planning: targets, order, input checks and skip decisions.
    fn prepare(
        &self,
        request: &RunRequest,
        graph: &DependencyGraph,
        run_id: &RunId,
    ) -> Result<Planned> {
        let mut resumed: HashMap<String, StepResult> = HashMap::new();

        let targets = match &request.resume {
            Some(prior_id) => {
                let prior = self
                    .store
                    .load_run(prior_id)?
                    .ok_or_else(|| GantryError::UnknownRun {
                        run_id: prior_id.to_string(),
                    })?;
                if !request.targets.is_empty() {
                    tracing::warn!(run_id = %prior_id, "ignoring targets: resuming a run");
                }
                for result in self.store.run_results(prior_id)? {
                    if result.status == StepStatus::Succeeded {
                        resumed.insert(result.step.clone(), result);
                    }
                }
                prior.targets
            }
            None => self.registry.expand_targets(&request.targets)?,
        };

        let order = graph.resolve(&targets)?;

        for name in &request.force {
            if !self.registry.contains(name) {
                return Err(GantryError::UnknownStep {
                    name: name.clone(),
                    referenced_by: None,
                });
            }
        }

        let mut context = InterpolationContext::new()
            .with_env(request.env.clone())
            .with_vars(self.registry.settings().vars.clone())
            .with_builtin("run_id", run_id.as_str())
            .with_builtin(
                "project_root",
                self.options.project_root.display().to_string(),
            );

        let definitions = order
            .iter()
            .map(|name| self.definition(name))
            .collect::<Result<Vec<_>>>()?;

        for definition in &definitions {
            check_inputs(definition, &context)?;
        }

        self.check_requested_outputs(&request.requested_outputs, &order)?;

        let forced: HashSet<&str> = request.force.iter().map(String::as_str).collect();
        let mut executing: HashSet<&str> = HashSet::new();
        let mut decisions = Vec::with_capacity(order.len());

        for definition in definitions {
            let name = definition.name.as_str();
            let fingerprint = definition.input_fingerprint(&context);

            let eligible = !request.force_all
                && !forced.contains(name)
                && definition
                    .depends_on
                    .iter()
                    .all(|dep| !executing.contains(dep.as_str()));

            let prior = if eligible {
                match resumed.remove(name) {
                    Some(result) => Some(result),
                    None => self
                        .store
                        .last_outcome(name)?
                        .filter(|last| last.status == StepStatus::Succeeded),
                }
            } else {
                None
            };

            match prior.filter(|p| p.fingerprint.as_deref() == Some(fingerprint.as_str())) {
                Some(prior) => {
                    context.add_outputs(name, prior.outputs.clone());
                    decisions.push(Decision::Skip { prior });
                }
                None => {
                    executing.insert(name);
                    decisions.push(Decision::Execute { fingerprint });
                }
            }
        }

        Ok(Planned {
            targets,
            order,
            context,
            decisions,
        })
    }

    fn definition(&self, name: &str) -> Result<&StepDefinition> {
        self.registry.get(name).ok_or_else(|| GantryError::UnknownStep {
            name: name.to_string(),
            referenced_by: None,
        })
    }

    fn check_requested_outputs(&self, requested: &[String], order: &[String]) -> Result<()> {
        for key in requested {
            let VariableRef::Output { step, output } = VariableRef::parse(key) else {
                return Err(GantryError::ConfigValidationError {
                    message: format!("Requested output '{}' must be 'step.output'", key),
                });
            };

            let declared = order.iter().any(|name| name == step)
                && self
                    .registry
                    .get(step)
                    .is_some_and(|d| d.outputs.contains_key(output));
            if !declared {
                return Err(GantryError::ConfigValidationError {
                    message: format!(
                        "Requested output '{}' is not declared by a step of this run",
                        key
                    ),
                });
            }
        }
        Ok(())
    }

    fn executor(&self, request: &RunRequest) -> StepExecutor {
        let matcher = SecretMatcher::with_builtins_and_custom(&self.options.secret_env);
        let mut masker = OutputMasker::new();
        masker.add_env(&request.env, &matcher);

        StepExecutor::new(
            Arc::clone(&self.runner),
            ExecutionOptions {
                output_limit: self.options.output_limit,
                project_root: self.options.project_root.clone(),
            },
        )
        .with_masker(masker)
    }

    /// Executing: dispatch ready steps to at most `width` workers.
    ///
    /// Only this thread changes step status; workers run the executor and
    /// send back `(position, outcome)`.
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        run_id: &RunId,
        graph: &DependencyGraph,
        executor: &StepExecutor,
        width: usize,
        results: &mut [StepResult],
        context: &mut InterpolationContext,
        on_progress: &mut dyn FnMut(RunProgress<'_>),
    ) -> Result<()> {
        let position: HashMap<String, usize> = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.step.clone(), i))
            .collect();
        let total = results.len();
        let cancel = self.cancel.child();
        let (tx, rx) = mpsc::channel::<(usize, ExecutionOutcome)>();

        thread::scope(|scope| {
            let scheduled = (|| -> Result<()> {
                let mut in_flight = 0usize;
                let mut started = 0usize;

                loop {
                    if !cancel.is_cancelled() {
                        for i in 0..total {
                            if in_flight >= width {
                                break;
                            }
                            if results[i].status != StepStatus::Pending {
                                continue;
                            }
                            let definition = self.definition(&results[i].step)?;
                            let ready = definition.depends_on.iter().all(|dep| {
                                position
                                    .get(dep)
                                    .is_some_and(|&d| results[d].status.satisfies_dependents())
                            });
                            if !ready {
                                continue;
                            }

                            advance(&mut results[i], StepStatus::Running)?;
                            self.store.put(run_id, &definition.name, &results[i])?;
                            started += 1;
                            tracing::info!(run_id = %run_id, step = %definition.name, "step running");
                            on_progress(RunProgress::StepStarting {
                                name: &definition.name,
                                index: started,
                                total,
                            });

                            let step_context = context.clone();
                            let cancel = cancel.clone();
                            let tx = tx.clone();
                            scope.spawn(move || {
                                let started = Instant::now();
                                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                                    executor.execute(definition, &step_context, &cancel)
                                }))
                                .unwrap_or_else(|_| {
                                    ExecutionOutcome::failed(
                                        FailureKind::Execution,
                                        "step executor panicked".to_string(),
                                        started,
                                    )
                                });
                                let _ = tx.send((i, outcome));
                            });
                            in_flight += 1;
                        }
                    }

                    if in_flight == 0 {
                        return Ok(());
                    }

                    let Ok((i, outcome)) = rx.recv() else {
                        return Ok(());
                    };
                    in_flight -= 1;

                    self.record_outcome(run_id, &mut results[i], outcome)?;
                    let name = results[i].step.clone();
                    on_progress(RunProgress::StepFinished {
                        name: &name,
                        result: &results[i],
                    });

                    if results[i].status == StepStatus::Succeeded {
                        context.add_outputs(&name, results[i].outputs.clone());
                    } else {
                        self.skip_dependents(
                            run_id,
                            graph,
                            &name,
                            &position,
                            &mut *results,
                            &mut *on_progress,
                        )?;
                    }
                }
            })();

            if scheduled.is_err() {
                cancel.cancel();
            }
            scheduled
        })?;

        // Whatever is still pending never started.
        for i in 0..total {
            if results[i].status != StepStatus::Pending {
                continue;
            }
            let reason = if cancel.is_cancelled() {
                SkipReason::Cancelled
            } else {
                let dependency = self
                    .definition(&results[i].step)?
                    .depends_on
                    .iter()
                    .find(|dep| {
                        position
                            .get(dep.as_str())
                            .is_some_and(|&d| !results[d].status.satisfies_dependents())
                    })
                    .cloned()
                    .unwrap_or_default();
                SkipReason::DependencyFailed { dependency }
            };

            let result = &mut results[i];
            advance(result, StepStatus::Skipped { reason })?;
            self.store.put(run_id, &result.step, result)?;
            tracing::info!(run_id = %run_id, step = %result.step, status = %result.status, "step skipped");
            if let StepStatus::Skipped { reason } = &result.status {
                on_progress(RunProgress::StepSkipped {
                    name: &result.step,
                    reason,
                });
            }
        }

        Ok(())
    }

    fn record_outcome(
        &self,
        run_id: &RunId,
        result: &mut StepResult,
        outcome: ExecutionOutcome,
    ) -> Result<()> {
        result.attempts = outcome.attempts;
        result.exit_code = outcome.exit_code;
        result.stdout = outcome.stdout;
        result.stderr = outcome.stderr;
        result.outputs = outcome.outputs;
        result.failure = outcome.failure;
        result.error = outcome.error;
        advance(result, outcome.status)?;

        self.store.put(run_id, &result.step, result)?;
        tracing::info!(
            run_id = %run_id,
            step = %result.step,
            status = %result.status,
            attempts = result.attempts,
            "step finished"
        );
        Ok(())
    }

    /// Mark not-yet-started transitive dependents of `failed` as skipped.
    fn skip_dependents(
        &self,
        run_id: &RunId,
        graph: &DependencyGraph,
        failed: &str,
        position: &HashMap<String, usize>,
        results: &mut [StepResult],
        on_progress: &mut dyn FnMut(RunProgress<'_>),
    ) -> Result<()> {
        let mut dependents: Vec<usize> = graph
            .transitive_dependents(failed)
            .iter()
            .filter_map(|name| position.get(name).copied())
            .collect();
        dependents.sort_unstable();

        for i in dependents {
            let result = &mut results[i];
            if result.status != StepStatus::Pending {
                continue;
            }
            advance(
                result,
                StepStatus::Skipped {
                    reason: SkipReason::DependencyFailed {
                        dependency: failed.to_string(),
                    },
                },
            )?;
            self.store.put(run_id, &result.step, result)?;
            tracing::info!(run_id = %run_id, step = %result.step, dependency = failed, "step skipped");
            if let StepStatus::Skipped { reason } = &result.status {
                on_progress(RunProgress::StepSkipped {
                    name: &result.step,
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("steps", &self.registry.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn advance(result: &mut StepResult, next: StepStatus) -> Result<()> {
    result
        .transition(next)
        .map_err(|e| GantryError::StepExecutionError {
            step: e.step.clone(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::OutputStream;
    use crate::shell::{CommandOptions, CommandResult, ResolvedCommand};
    use crate::state::MemoryStateStore;
    use crate::steps::definition::{OutputCapture, RetryPolicy};
    use regex::Regex;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Succeeds unless the program is listed in `failing`; prints its args.
    #[derive(Default)]
    struct FakeRunner {
        failing: HashSet<String>,
        calls: Mutex<Vec<ResolvedCommand>>,
        on_run: Option<CancellationToken>,
    }

    impl FakeRunner {
        fn failing(programs: &[&str]) -> Self {
            Self {
                failing: programs.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }
        }

        fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.program.clone())
                .collect()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: &ResolvedCommand, _: &CommandOptions) -> Result<CommandResult> {
            self.calls.lock().unwrap().push(command.clone());
            if let Some(token) = &self.on_run {
                token.cancel();
            }
            let duration = Duration::from_millis(1);
            if self.failing.contains(&command.program) {
                Ok(CommandResult::failure(
                    Some(1),
                    String::new(),
                    "boom".to_string(),
                    duration,
                ))
            } else {
                Ok(CommandResult::success(
                    command.args.join(" "),
                    String::new(),
                    duration,
                ))
            }
        }
    }

    fn registry() -> StepRegistry {
        StepRegistry::new(vec![
            StepDefinition::new("provision", "provision")
                .with_args(["login_server=acr.io"])
                .with_output(
                    "login_server",
                    OutputCapture {
                        stream: OutputStream::Stdout,
                        pattern: Some(Regex::new("login_server=(.+)").unwrap()),
                    },
                ),
            StepDefinition::new("build", "build").with_args(["${IMAGE_TAG}"]),
            StepDefinition::new("push", "push").with_depends_on(["build"]),
            StepDefinition::new("deploy", "deploy")
                .with_args(["${provision.login_server}"])
                .with_depends_on(["push", "provision"]),
        ])
        .unwrap()
    }

    fn orchestrator(
        store: Arc<MemoryStateStore>,
        runner: Arc<FakeRunner>,
    ) -> Orchestrator {
        Orchestrator::new(registry(), store, OrchestratorOptions::default()).with_runner(runner)
    }

    fn request() -> RunRequest {
        RunRequest::new(["deploy"]).with_var("IMAGE_TAG", "v1")
    }

    #[test]
    fn runs_in_dependency_order_and_threads_outputs() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = Arc::new(FakeRunner::default());

        let report = orchestrator(store.clone(), runner.clone())
            .submit_run(request().request_output("provision.login_server"))
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(runner.programs(), ["provision", "build", "push", "deploy"]);
        assert_eq!(runner.calls.lock().unwrap()[3].args, ["acr.io"]);
        assert_eq!(report.outputs["provision.login_server"], "acr.io");

        let run = store.load_run(&report.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.order, ["provision", "build", "push", "deploy"]);
    }

    #[test]
    fn second_run_skips_everything_and_restores_outputs() {
        let store = Arc::new(MemoryStateStore::new());
        let first = Arc::new(FakeRunner::default());
        orchestrator(store.clone(), first).submit_run(request()).unwrap();

        let second = Arc::new(FakeRunner::default());
        let report = orchestrator(store, second.clone())
            .submit_run(request().request_output("provision.login_server"))
            .unwrap();

        assert!(second.programs().is_empty());
        assert!(report.steps.iter().all(|s| s.status
            == StepStatus::Skipped {
                reason: SkipReason::AlreadySatisfied
            }));
        assert_eq!(report.outputs["provision.login_server"], "acr.io");
        assert!(report.is_success());
    }

    #[test]
    fn changed_env_value_reexecutes_step_and_dependents() {
        let store = Arc::new(MemoryStateStore::new());
        orchestrator(store.clone(), Arc::new(FakeRunner::default()))
            .submit_run(request())
            .unwrap();

        let runner = Arc::new(FakeRunner::default());
        orchestrator(store, runner.clone())
            .submit_run(RunRequest::new(["deploy"]).with_var("IMAGE_TAG", "v2"))
            .unwrap();

        assert_eq!(runner.programs(), ["build", "push", "deploy"]);
    }

    #[test]
    fn forced_step_cascades_to_dependents() {
        let store = Arc::new(MemoryStateStore::new());
        orchestrator(store.clone(), Arc::new(FakeRunner::default()))
            .submit_run(request())
            .unwrap();

        let runner = Arc::new(FakeRunner::default());
        orchestrator(store, runner.clone())
            .submit_run(request().force("push"))
            .unwrap();

        assert_eq!(runner.programs(), ["push", "deploy"]);
    }

    #[test]
    fn failure_skips_dependents_but_not_independent_steps() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = Arc::new(FakeRunner::failing(&["build"]));

        let report = orchestrator(store, runner.clone())
            .submit_run(request())
            .unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(runner.programs(), ["provision", "build"]);
        assert_eq!(report.step("provision").unwrap().status, StepStatus::Succeeded);
        assert_eq!(report.step("build").unwrap().status, StepStatus::Failed);
        for name in ["push", "deploy"] {
            assert_eq!(
                report.step(name).unwrap().status,
                StepStatus::Skipped {
                    reason: SkipReason::DependencyFailed {
                        dependency: "build".to_string()
                    }
                }
            );
        }
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn resume_reuses_successes_of_the_failed_run() {
        let store = Arc::new(MemoryStateStore::new());
        let failed = orchestrator(store.clone(), Arc::new(FakeRunner::failing(&["push"])))
            .submit_run(request())
            .unwrap();
        assert_eq!(failed.status, RunStatus::Failed);

        let runner = Arc::new(FakeRunner::default());
        let resumed = orchestrator(store, runner.clone())
            .submit_run(RunRequest::default().with_var("IMAGE_TAG", "v1").resume(failed.run_id.clone()))
            .unwrap();

        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.resumed_from.as_ref(), Some(&failed.run_id));
        assert_eq!(runner.programs(), ["push", "deploy"]);
    }

    #[test]
    fn resume_of_unknown_run_is_rejected() {
        let store = Arc::new(MemoryStateStore::new());
        let err = orchestrator(store, Arc::new(FakeRunner::default()))
            .submit_run(RunRequest::default().resume(RunId::new("20260101T000000Z-deadbeef")))
            .unwrap_err();

        assert!(matches!(err, GantryError::UnknownRun { .. }));
    }

    #[test]
    fn missing_variable_fails_before_any_invocation() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = Arc::new(FakeRunner::default());

        let err = orchestrator(store.clone(), runner.clone())
            .submit_run(RunRequest::new(["deploy"]))
            .unwrap_err();

        assert!(matches!(err, GantryError::UnresolvedVariable { ref variable, .. } if variable == "IMAGE_TAG"));
        assert!(err.is_configuration());
        assert!(runner.programs().is_empty());
        assert!(store.list_runs().unwrap().is_empty());
    }

    #[test]
    fn unknown_requested_output_is_rejected() {
        let store = Arc::new(MemoryStateStore::new());
        let err = orchestrator(store, Arc::new(FakeRunner::default()))
            .submit_run(request().request_output("build.digest"))
            .unwrap_err();

        assert!(matches!(err, GantryError::ConfigValidationError { .. }));
    }

    #[test]
    fn cancellation_skips_unstarted_steps() {
        let store = Arc::new(MemoryStateStore::new());
        let cancel = CancellationToken::new();
        let runner = Arc::new(FakeRunner {
            on_run: Some(cancel.clone()),
            ..Default::default()
        });

        let report = orchestrator(store, runner.clone())
            .with_cancellation(cancel)
            .submit_run(request())
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.exit_code(), 130);
        assert_eq!(runner.programs(), ["provision"]);
        assert_eq!(report.step("provision").unwrap().status, StepStatus::Succeeded);
        assert_eq!(
            report.step("deploy").unwrap().status,
            StepStatus::Skipped {
                reason: SkipReason::Cancelled
            }
        );
    }

    #[test]
    fn parallel_width_runs_every_step() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = Arc::new(FakeRunner::default());

        let report = orchestrator(store, runner.clone())
            .submit_run(request().with_max_parallel(4))
            .unwrap();

        assert!(report.is_success());
        let programs = runner.programs();
        assert_eq!(programs.len(), 4);
        let at = |p: &str| programs.iter().position(|x| x == p).unwrap();
        assert!(at("build") < at("push"));
        assert!(at("push") < at("deploy"));
        assert!(at("provision") < at("deploy"));
    }

    #[test]
    fn retries_are_reported() {
        let registry = StepRegistry::new(vec![StepDefinition::new("flaky", "flaky").with_retry(
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        )])
        .unwrap();
        let runner = Arc::new(FakeRunner::failing(&["flaky"]));

        let report = Orchestrator::new(
            registry,
            Arc::new(MemoryStateStore::new()),
            OrchestratorOptions::default(),
        )
        .with_runner(runner.clone())
        .submit_run(RunRequest::new(["flaky"]))
        .unwrap();

        assert_eq!(runner.programs().len(), 3);
        let step = report.step("flaky").unwrap();
        assert_eq!(step.attempts, 3);
        assert_eq!(step.output.as_deref(), Some("boom"));
    }

    #[test]
    fn plan_reports_decisions_without_side_effects() {
        let store = Arc::new(MemoryStateStore::new());
        let runner = Arc::new(FakeRunner::default());
        let orchestrator = orchestrator(store.clone(), runner.clone());

        let plan = orchestrator.plan(&request()).unwrap();
        assert_eq!(plan.order, ["provision", "build", "push", "deploy"]);
        assert_eq!(plan.groups[0], ["provision", "build"]);
        assert_eq!(plan.execute_count(), 4);
        assert!(store.list_runs().unwrap().is_empty());
        assert!(runner.programs().is_empty());

        orchestrator.submit_run(request()).unwrap();
        let plan = orchestrator.plan(&request()).unwrap();
        assert_eq!(plan.execute_count(), 0);
    }
}
