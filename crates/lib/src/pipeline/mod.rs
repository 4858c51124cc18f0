//! Pipeline construction and sequential execution.
//!
//! A pipeline is one flat, ordered task list built from two sources: the
//! tasks extensions registered in the [`TaskSlot`], and the tasks the
//! environment contributes for the selected pipe. Registered tasks are split
//! into two buckets around the environment's tasks:
//!
//! ```text
//! start bucket (Start + unspecified) ++ environment tasks ++ end bucket
//! ```
//!
//! Within a bucket registration order is kept. The order is a pure function of
//! the slot snapshot and the environment's task list.
//!
//! # Submodules
//!
//! - [`environment`] - Environment capabilities and pipe selection
//! - [`types`] - Result and error types

pub mod environment;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::artifact::ArtifactFactory;
use crate::component::{Component, ComponentId};
use crate::context::BuildContext;
use crate::report::Reporter;
use crate::task::{BuildTask, TaskBatch, TaskLocation, TaskSlot};

pub use environment::{Environment, PipeKind, PipeSelector, StaticEnvironment, TaskList, UnknownPipe};
pub use types::{
  BuildError, BuildPipeResults, BuiltTaskResult, ComponentOutcome, ComponentResult, RunError, RunState, TaskError,
  TaskResult,
};

/// Merge registered batches and environment tasks into one ordered list.
pub fn build_pipe(batches: &[TaskBatch], env_tasks: TaskList) -> TaskList {
  let mut start = Vec::new();
  let mut end = Vec::new();

  for task in batches.iter().flat_map(|b| b.tasks.iter()) {
    match task.location() {
      Some(TaskLocation::End) => end.push(task.clone()),
      Some(TaskLocation::Start) | None => start.push(task.clone()),
    }
  }

  let mut pipe = Vec::with_capacity(start.len() + env_tasks.len() + end.len());
  pipe.extend(start);
  pipe.extend(env_tasks);
  pipe.extend(end);
  pipe
}

/// What [`BuildPipe::execute`] produced.
#[derive(Debug, Clone, Default)]
pub struct PipeOutcome {
  /// Results of every task that ran, in execution order.
  pub results: BuildPipeResults,
  /// Set when the run stopped before the last task.
  pub aborted: Option<RunError>,
}

/// An ordered task list ready to run.
#[derive(Clone, Default)]
pub struct BuildPipe {
  tasks: TaskList,
}

impl std::fmt::Debug for BuildPipe {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildPipe").field("tasks", &self.task_names()).finish()
  }
}

impl BuildPipe {
  pub fn from_tasks(tasks: TaskList) -> Self {
    Self { tasks }
  }

  /// Build the pipe of `kind` for `env` from a snapshot of `slot`.
  ///
  /// Fails with [`BuildError::Configuration`] when the environment exposes the
  /// legacy combined pipe.
  pub fn from_environment(slot: &TaskSlot, env: &dyn Environment, kind: PipeKind) -> Result<Self, BuildError> {
    if env.legacy_pipe().is_some() {
      return Err(BuildError::Configuration(format!(
        "environment '{}' exposes the legacy pipe capability; move its tasks to '{}'",
        env.id(),
        kind.capability_name()
      )));
    }

    let env_tasks = (kind.selector())(env).unwrap_or_default();
    let batches = slot.snapshot();
    let tasks = build_pipe(&batches, env_tasks);

    debug!(
      env = %env.id(),
      pipe = %kind,
      tasks = tasks.len(),
      "built pipeline"
    );

    Ok(Self { tasks })
  }

  pub fn tasks(&self) -> &[Arc<dyn BuildTask>] {
    &self.tasks
  }

  pub fn task_names(&self) -> Vec<&str> {
    self.tasks.iter().map(|t| t.name()).collect()
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  /// Run every task in order against `ctx`.
  ///
  /// Component failures are recorded and the run continues. A task reporting
  /// `pipeline_fatal`, or one that removed or replaced components of `ctx`,
  /// stops the run after its result is recorded.
  pub async fn execute(&self, ctx: &mut BuildContext, reporter: &dyn Reporter) -> PipeOutcome {
    let total = self.tasks.len();
    let expected = ctx.component_ids();
    let mut outcome = PipeOutcome::default();

    info!(tasks = total, components = expected.len(), "executing pipeline");

    for (index, task) in self.tasks.iter().enumerate() {
      let name = task.name().to_string();
      debug!(run = %ctx.run_id, state = ?RunState::Executing(index), "run state");
      reporter.state_changed(&ctx.run_id, RunState::Executing(index));
      reporter.task_started(index, total, &name);
      debug!(task = %name, step = index + 1, total, "starting task");

      let before = ctx.components.clone();
      let mut factory = ArtifactFactory::new(&name);
      let started = Instant::now();

      let built = task.execute(ctx, &mut factory).await;

      let elapsed = started.elapsed();
      let (artifacts, artifact_errors) = factory.into_parts();
      let violation = check_components(&name, &before, ctx);
      let fatal = built.pipeline_fatal;

      let result = TaskResult::fold(&name, &expected, built, artifacts, artifact_errors, elapsed);
      if result.has_errors() {
        warn!(task = %name, failed = ?result.failed_components, "task recorded component errors");
      }
      reporter.task_finished(&result);
      outcome.results.push(result);

      if let Some(violation) = violation {
        error!(task = %name, error = %violation, "aborting pipeline");
        outcome.aborted = Some(violation);
        break;
      }

      if fatal {
        let abort = RunError::Aborted { task: name, index, total };
        error!(error = %abort, "aborting pipeline");
        outcome.aborted = Some(abort);
        break;
      }
    }

    info!(
      executed = outcome.results.len(),
      aborted = outcome.aborted.is_some(),
      "pipeline execution complete"
    );

    outcome
  }
}

/// Detect tasks that removed or replaced components, or dropped capsules.
fn check_components(task: &str, before: &[Component], ctx: &BuildContext) -> Option<RunError> {
  let violation = |detail: String| {
    Some(RunError::ContextViolation {
      task: task.to_string(),
      detail,
    })
  };

  if ctx.components.len() != before.len() {
    return violation(format!(
      "component count changed from {} to {}",
      before.len(),
      ctx.components.len()
    ));
  }

  if let Some((was, now)) = before.iter().zip(ctx.components.iter()).find(|(was, now)| was != now) {
    return violation(if was.id == now.id {
      format!("component {} was replaced", was.id)
    } else {
      format!("component {} was replaced by {}", was.id, now.id)
    });
  }

  let missing: Vec<ComponentId> = ctx.capsule_graph.missing(&ctx.component_ids());
  if !missing.is_empty() {
    let ids: Vec<&str> = missing.iter().map(|id| id.as_str()).collect();
    return violation(format!("capsules removed for {}", ids.join(", ")));
  }

  None
}
