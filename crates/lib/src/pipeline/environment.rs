//! Environment capability contract and pipe selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::task::BuildTask;

/// Ordered tasks of one pipe.
pub type TaskList = Vec<Arc<dyn BuildTask>>;

/// A build environment (e.g. a language toolchain) contributing its own tasks.
///
/// Every pipe is optional. An environment that still exposes the retired
/// combined pipe through [`Environment::legacy_pipe`] is rejected when a
/// pipeline is built for it.
pub trait Environment: Send + Sync {
  fn id(&self) -> &str;

  fn build_pipe(&self) -> Option<TaskList> {
    None
  }

  fn deploy_pipe(&self) -> Option<TaskList> {
    None
  }

  fn legacy_pipe(&self) -> Option<TaskList> {
    None
  }
}

/// Resolves the tasks of one pipe from an environment.
pub type PipeSelector = fn(&dyn Environment) -> Option<TaskList>;

fn select_build(env: &dyn Environment) -> Option<TaskList> {
  env.build_pipe()
}

fn select_deploy(env: &dyn Environment) -> Option<TaskList> {
  env.deploy_pipe()
}

/// The pipes a pipeline can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeKind {
  Build,
  Deploy,
}

impl PipeKind {
  pub fn selector(&self) -> PipeSelector {
    match self {
      PipeKind::Build => select_build,
      PipeKind::Deploy => select_deploy,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      PipeKind::Build => "build",
      PipeKind::Deploy => "deploy",
    }
  }

  /// Name of the environment capability backing this pipe.
  pub fn capability_name(&self) -> &'static str {
    match self {
      PipeKind::Build => "build_pipe",
      PipeKind::Deploy => "deploy_pipe",
    }
  }
}

impl fmt::Display for PipeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown pipe '{0}', expected 'build' or 'deploy'")]
pub struct UnknownPipe(pub String);

impl FromStr for PipeKind {
  type Err = UnknownPipe;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "build" => Ok(PipeKind::Build),
      "deploy" => Ok(PipeKind::Deploy),
      other => Err(UnknownPipe(other.to_string())),
    }
  }
}

/// Environment assembled from task lists at wiring time.
#[derive(Default)]
pub struct StaticEnvironment {
  id: String,
  build: Option<TaskList>,
  deploy: Option<TaskList>,
  legacy: Option<TaskList>,
}

impl StaticEnvironment {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Default::default()
    }
  }

  pub fn with_build(mut self, tasks: TaskList) -> Self {
    self.build = Some(tasks);
    self
  }

  pub fn with_deploy(mut self, tasks: TaskList) -> Self {
    self.deploy = Some(tasks);
    self
  }

  pub fn with_legacy(mut self, tasks: TaskList) -> Self {
    self.legacy = Some(tasks);
    self
  }
}

impl fmt::Debug for StaticEnvironment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names = |tasks: &Option<TaskList>| {
      tasks
        .as_ref()
        .map(|t| t.iter().map(|t| t.name().to_string()).collect::<Vec<_>>())
    };
    f.debug_struct("StaticEnvironment")
      .field("id", &self.id)
      .field("build", &names(&self.build))
      .field("deploy", &names(&self.deploy))
      .field("legacy", &names(&self.legacy))
      .finish()
  }
}

impl Environment for StaticEnvironment {
  fn id(&self) -> &str {
    &self.id
  }

  fn build_pipe(&self) -> Option<TaskList> {
    self.build.clone()
  }

  fn deploy_pipe(&self) -> Option<TaskList> {
    self.deploy.clone()
  }

  fn legacy_pipe(&self) -> Option<TaskList> {
    self.legacy.clone()
  }
}
