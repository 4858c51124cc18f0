//! Result and error types for pipeline construction and execution.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::artifact::{Artifact, ArtifactError};
use crate::capsule::CapsuleError;
use crate::component::ComponentId;

/// Errors that stop a run before any task executes.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The environment's capability surface is inconsistent.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// The capsule provider failed.
  #[error("provisioning failed: {0}")]
  Provisioning(#[from] CapsuleError),

  /// The capsule provider returned a graph without some requested components.
  #[error("provisioning incomplete, no capsule for: {}", join_ids(.0))]
  MissingCapsules(Vec<ComponentId>),
}

impl BuildError {
  pub fn is_configuration(&self) -> bool {
    matches!(self, BuildError::Configuration(_))
  }

  pub fn is_provisioning(&self) -> bool {
    matches!(self, BuildError::Provisioning(_) | BuildError::MissingCapsules(_))
  }
}

/// Run-level errors raised while tasks are executing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RunError {
  /// A task reported a pipeline-fatal failure.
  #[error("pipeline aborted by task '{task}' (task {} of {total})", .index + 1)]
  Aborted { task: String, index: usize, total: usize },

  /// A task removed or replaced components of the shared build context.
  #[error("task '{task}' modified the build context components: {detail}")]
  ContextViolation { task: String, detail: String },
}

fn join_ids(ids: &[ComponentId]) -> String {
  ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

/// Where a run is.
///
/// ```text
/// Building -> Provisioning -> Executing(0..n) -> Completed | Aborted
/// Building -> Rejected
/// Building -> Provisioning -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
  Building,
  Provisioning,
  /// Running the task at this index.
  Executing(usize),
  Completed,
  Aborted,
  Rejected,
}

/// Errors a task reports for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentOutcome {
  pub component: ComponentId,
  pub errors: Vec<String>,
}

/// What a task hands back to the executor.
///
/// Components not mentioned succeeded. Artifacts are not part of this value;
/// they are registered through the invocation's `ArtifactFactory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuiltTaskResult {
  pub components: Vec<ComponentOutcome>,
  /// Components the task failed for entirely, as opposed to a recorded error.
  pub failed_components: Vec<ComponentId>,
  /// Abort the remainder of the pipeline after this task.
  pub pipeline_fatal: bool,
}

impl BuiltTaskResult {
  pub fn success() -> Self {
    Self::default()
  }

  pub fn record_error(&mut self, component: &ComponentId, error: impl Into<String>) {
    let error = error.into();
    match self.components.iter_mut().find(|o| &o.component == component) {
      Some(outcome) => outcome.errors.push(error),
      None => self.components.push(ComponentOutcome {
        component: component.clone(),
        errors: vec![error],
      }),
    }
  }

  pub fn with_error(mut self, component: impl Into<ComponentId>, error: impl Into<String>) -> Self {
    self.record_error(&component.into(), error);
    self
  }

  pub fn with_failed_component(mut self, component: impl Into<ComponentId>) -> Self {
    self.failed_components.push(component.into());
    self
  }

  pub fn fatal(mut self) -> Self {
    self.pipeline_fatal = true;
    self
  }

  pub fn has_errors(&self) -> bool {
    !self.failed_components.is_empty() || self.components.iter().any(|o| !o.errors.is_empty())
  }
}

/// Outcome of one task for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentResult {
  pub component: ComponentId,
  pub artifacts: Vec<Artifact>,
  pub errors: Vec<String>,
}

impl ComponentResult {
  pub fn is_success(&self) -> bool {
    self.errors.is_empty()
  }
}

/// Recorded result of one executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
  pub task: String,
  /// One entry per component in the build context, in context order.
  pub components: Vec<ComponentResult>,
  pub failed_components: Vec<ComponentId>,
  pub pipeline_fatal: bool,
  pub duration: Duration,
}

impl TaskResult {
  /// Fold a task's own report and its artifact factory into one result.
  ///
  /// `expected` is the component set of the run; outcomes for components
  /// outside it are dropped with a warning.
  pub(crate) fn fold(
    task: &str,
    expected: &[ComponentId],
    built: BuiltTaskResult,
    artifacts: Vec<Artifact>,
    artifact_errors: Vec<(ComponentId, ArtifactError)>,
    duration: Duration,
  ) -> Self {
    let foreign = built
      .components
      .iter()
      .map(|o| &o.component)
      .chain(built.failed_components.iter())
      .chain(artifacts.iter().map(|a| &a.component))
      .filter(|id| !expected.contains(id));
    for id in foreign {
      warn!(task = %task, component = %id, "dropping outcome for component outside the run");
    }

    let components = expected
      .iter()
      .map(|id| {
        let mut errors: Vec<String> = built
          .components
          .iter()
          .filter(|o| &o.component == id)
          .flat_map(|o| o.errors.iter().cloned())
          .collect();
        errors.extend(
          artifact_errors
            .iter()
            .filter(|(component, _)| component == id)
            .map(|(_, e)| e.to_string()),
        );
        if errors.is_empty() && built.failed_components.contains(id) {
          errors.push(format!("task '{}' failed for component {}", task, id));
        }
        ComponentResult {
          component: id.clone(),
          artifacts: artifacts.iter().filter(|a| &a.component == id).cloned().collect(),
          errors,
        }
      })
      .collect();

    Self {
      task: task.to_string(),
      components,
      failed_components: built
        .failed_components
        .into_iter()
        .filter(|id| expected.contains(id))
        .collect(),
      pipeline_fatal: built.pipeline_fatal,
      duration,
    }
  }

  pub fn component(&self, id: &ComponentId) -> Option<&ComponentResult> {
    self.components.iter().find(|c| &c.component == id)
  }

  pub fn has_errors(&self) -> bool {
    !self.failed_components.is_empty() || self.components.iter().any(|c| !c.errors.is_empty())
  }
}

/// A recorded error flattened out of [`BuildPipeResults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskError {
  pub task: String,
  pub component: ComponentId,
  pub message: String,
}

/// Ordered results of every executed task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPipeResults {
  tasks: Vec<TaskResult>,
}

impl BuildPipeResults {
  pub(crate) fn push(&mut self, result: TaskResult) {
    self.tasks.push(result);
  }

  pub fn tasks(&self) -> &[TaskResult] {
    &self.tasks
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  pub fn task(&self, name: &str) -> Option<&TaskResult> {
    self.tasks.iter().find(|t| t.task == name)
  }

  /// True if any component suffered any failure at any task.
  pub fn has_errors(&self) -> bool {
    self.tasks.iter().any(TaskResult::has_errors)
  }

  pub fn errors(&self) -> Vec<TaskError> {
    self
      .tasks
      .iter()
      .flat_map(|t| {
        t.components.iter().flat_map(move |c| {
          c.errors.iter().map(move |message| TaskError {
            task: t.task.clone(),
            component: c.component.clone(),
            message: message.clone(),
          })
        })
      })
      .collect()
  }

  /// Components with at least one error, deduplicated, in first-failure order.
  pub fn failed_components(&self) -> Vec<ComponentId> {
    let mut failed: Vec<ComponentId> = Vec::new();
    for task in &self.tasks {
      let ids = task
        .components
        .iter()
        .filter(|c| !c.is_success())
        .map(|c| &c.component)
        .chain(task.failed_components.iter());
      for id in ids {
        if !failed.contains(id) {
          failed.push(id.clone());
        }
      }
    }
    failed
  }

  /// All artifacts recorded for `component`, in task order.
  pub fn artifacts_for(&self, component: &ComponentId) -> Vec<&Artifact> {
    self
      .tasks
      .iter()
      .filter_map(|t| t.component(component))
      .flat_map(|c| c.artifacts.iter())
      .collect()
  }
}
