//! The builder service: one entry point per pipeline run.
//!
//! A run moves through
//!
//! ```text
//! Building -> Provisioning -> Executing(0..n) -> Completed | Aborted
//! Building -> Rejected
//! Building -> Provisioning -> Aborted
//! ```
//!
//! Every transition is reported through [`Reporter::state_changed`]; the
//! executor reports one `Executing(i)` per task.
//!
//! Rejected runs and runs whose provisioning fails execute no tasks and are
//! returned as `Err`. Everything that happens once tasks run, including a
//! fatal abort, is returned as `Ok` and must be inspected by the caller.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

pub use crate::pipeline::RunState;

use crate::capsule::{CapsuleProvider, NetworkOptions};
use crate::component::Component;
use crate::context::{BuildContext, ExecutionContext};
use crate::pipeline::{BuildError, BuildPipe, BuildPipeResults, Environment, PipeKind, RunError};
use crate::report::{Reporter, TracingReporter};
use crate::task::TaskSlot;

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildServiceResults {
  /// Environment id of the run.
  pub id: String,
  pub run_id: String,
  pub build_results: BuildPipeResults,
  pub components: Vec<Component>,
  /// Run-level errors. Component errors live in `build_results`.
  pub errors: Vec<RunError>,
  pub state: RunState,
}

impl BuildServiceResults {
  /// No run-level error and no component error at any task.
  pub fn is_success(&self) -> bool {
    self.errors.is_empty() && !self.build_results.has_errors()
  }
}

/// Runs one pipe for one environment and its components.
///
/// Holds only shared handles; independent runs may use the same service
/// concurrently.
pub struct BuilderService {
  slot: Arc<TaskSlot>,
  provider: Arc<dyn CapsuleProvider>,
  reporter: Arc<dyn Reporter>,
  pipe: PipeKind,
  options: NetworkOptions,
}

impl BuilderService {
  pub fn new(slot: Arc<TaskSlot>, provider: Arc<dyn CapsuleProvider>, pipe: PipeKind) -> Self {
    Self {
      slot,
      provider,
      reporter: Arc::new(TracingReporter),
      pipe,
      options: NetworkOptions::reuse_existing(),
    }
  }

  pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = reporter;
    self
  }

  pub fn with_network_options(mut self, options: NetworkOptions) -> Self {
    self.options = options;
    self
  }

  pub fn pipe(&self) -> PipeKind {
    self.pipe
  }

  /// The pipeline a run for `env` would execute, without running anything.
  pub fn plan(&self, env: &dyn Environment) -> Result<BuildPipe, BuildError> {
    BuildPipe::from_environment(&self.slot, env, self.pipe)
  }

  pub async fn run(&self, exec: ExecutionContext) -> Result<BuildServiceResults, BuildError> {
    let title = format!(
      "running {} pipe for environment {}, total {} components",
      self.pipe,
      exec.id,
      exec.components.len()
    );
    let started = Instant::now();

    self.reporter.title(&title);
    self.reporter.start_long_process(&title);
    self.transition(&exec.run_id, RunState::Building);

    let result = self.run_inner(exec).await;

    self.reporter.end_long_process(&title, started.elapsed());
    match &result {
      Ok(results) if results.is_success() => {
        self.reporter.success(&format!("{} pipe completed for environment {}", self.pipe, results.id));
      }
      Ok(results) => {
        let failed = results.build_results.failed_components().len();
        let message = match results.errors.first() {
          Some(run_error) => format!("{} pipe failed for environment {}: {}", self.pipe, results.id, run_error),
          None => format!(
            "{} pipe failed for environment {}: {} component(s) with errors",
            self.pipe, results.id, failed
          ),
        };
        self.reporter.failure(&message);
      }
      Err(e) => self.reporter.failure(&format!("{} pipe failed: {}", self.pipe, e)),
    }

    result
  }

  async fn run_inner(&self, exec: ExecutionContext) -> Result<BuildServiceResults, BuildError> {
    let pipe = match self.plan(exec.env.as_ref()) {
      Ok(pipe) => pipe,
      Err(e) => {
        self.transition(&exec.run_id, RunState::Rejected);
        error!(env = %exec.id, error = %e, "run rejected");
        return Err(e);
      }
    };

    self.transition(&exec.run_id, RunState::Provisioning);
    let ids = exec.component_ids();
    let graph = match self.provider.create_network(&ids, &self.options).await {
      Ok(graph) => graph,
      Err(e) => {
        self.transition(&exec.run_id, RunState::Aborted);
        error!(env = %exec.id, error = %e, "provisioning failed");
        return Err(BuildError::from(e));
      }
    };

    let missing = graph.missing(&ids);
    if !missing.is_empty() {
      self.transition(&exec.run_id, RunState::Aborted);
      error!(env = %exec.id, missing = ?missing, "provisioning incomplete");
      return Err(BuildError::MissingCapsules(missing));
    }

    debug!(env = %exec.id, capsules = graph.len(), "capsules ready");

    let id = exec.id.clone();
    let run_id = exec.run_id.clone();
    let mut ctx = BuildContext::new(exec, graph);
    let outcome = pipe.execute(&mut ctx, self.reporter.as_ref()).await;

    let state = if outcome.aborted.is_some() {
      RunState::Aborted
    } else {
      RunState::Completed
    };
    self.transition(&run_id, state);
    info!(
      env = %id,
      run = %run_id,
      state = ?state,
      tasks = outcome.results.len(),
      "run finished"
    );

    Ok(BuildServiceResults {
      id,
      run_id,
      build_results: outcome.results,
      components: ctx.into_components(),
      errors: outcome.aborted.into_iter().collect(),
      state,
    })
  }

  fn transition(&self, run_id: &str, state: RunState) {
    debug!(run = %run_id, state = ?state, "run state");
    self.reporter.state_changed(run_id, state);
  }
}
