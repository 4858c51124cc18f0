//! Shared fakes for pipeline integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipewright_lib::artifact::ArtifactFactory;
use pipewright_lib::capsule::{Capsule, CapsuleError, CapsuleGraph, CapsuleProvider, NetworkOptions};
use pipewright_lib::component::{Component, ComponentId};
use pipewright_lib::context::{BuildContext, ExecutionContext};
use pipewright_lib::pipeline::{BuiltTaskResult, StaticEnvironment};
use pipewright_lib::report::Reporter;
use pipewright_lib::task::{BuildTask, TaskLocation};

/// Order in which tasks ran, shared by every task of a test.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
  log.lock().unwrap().clone()
}

/// Provider handing out fake capsules and counting calls.
#[derive(Default)]
pub struct CountingProvider {
  pub calls: AtomicUsize,
}

impl CountingProvider {
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl CapsuleProvider for CountingProvider {
  async fn create_network(&self, ids: &[ComponentId], _options: &NetworkOptions) -> Result<CapsuleGraph, CapsuleError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let mut graph = CapsuleGraph::new();
    for id in ids {
      graph.add(Capsule {
        component: id.clone(),
        path: std::env::temp_dir().join(id.as_str()),
        reused: false,
      });
    }
    Ok(graph)
  }
}

/// What a [`Recording`] task does for each run.
#[derive(Clone, Default)]
pub enum Behavior {
  #[default]
  Succeed,
  /// Record an error for these components.
  FailFor(Vec<ComponentId>),
  /// Record an error for every component and abort the pipeline.
  Fatal,
  /// Register an artifact under the same name twice for every component.
  DuplicateArtifact(String),
  /// Register one artifact per component.
  Artifact(String),
  /// Remove the last component from the build context.
  DropComponent,
}

/// Task that appends its name to the log and behaves as configured.
pub struct Recording {
  name: String,
  location: Option<TaskLocation>,
  behavior: Behavior,
  log: Log,
}

impl Recording {
  pub fn new(name: &str, log: &Log) -> Self {
    Self {
      name: name.to_string(),
      location: None,
      behavior: Behavior::Succeed,
      log: log.clone(),
    }
  }

  pub fn at(mut self, location: TaskLocation) -> Self {
    self.location = Some(location);
    self
  }

  pub fn behave(mut self, behavior: Behavior) -> Self {
    self.behavior = behavior;
    self
  }

  pub fn into_task(self) -> Arc<dyn BuildTask> {
    Arc::new(self)
  }
}

#[async_trait]
impl BuildTask for Recording {
  fn name(&self) -> &str {
    &self.name
  }

  fn location(&self) -> Option<TaskLocation> {
    self.location
  }

  async fn execute(&self, ctx: &mut BuildContext, artifacts: &mut ArtifactFactory) -> BuiltTaskResult {
    self.log.lock().unwrap().push(self.name.clone());
    let mut result = BuiltTaskResult::success();

    match &self.behavior {
      Behavior::Succeed => {}
      Behavior::FailFor(ids) => {
        for id in ids {
          result.record_error(id, format!("{} failed", self.name));
        }
      }
      Behavior::Fatal => {
        for id in ctx.component_ids() {
          result.record_error(&id, "fatal failure");
        }
        result.pipeline_fatal = true;
      }
      Behavior::DuplicateArtifact(name) => {
        for id in ctx.component_ids() {
          let _ = artifacts.create(&id, name, vec!["first".into()]);
          let _ = artifacts.create(&id, name, vec!["second".into()]);
        }
      }
      Behavior::Artifact(name) => {
        for id in ctx.component_ids() {
          let path = ctx.capsule(&id).map(|c| c.path.join(name)).unwrap_or_default();
          let _ = artifacts.create(&id, name, vec![path]);
        }
      }
      Behavior::DropComponent => {
        ctx.components.pop();
      }
    }

    result
  }
}

pub fn components(names: &[&str]) -> Vec<Component> {
  names
    .iter()
    .map(|n| Component::new(*n, std::env::temp_dir().join(n)))
    .collect()
}

pub fn exec(env: StaticEnvironment, names: &[&str]) -> ExecutionContext {
  ExecutionContext::new(Arc::new(env), components(names))
}

/// Reporter collecting banners and long-process markers.
#[derive(Default)]
pub struct Banners {
  events: Mutex<Vec<String>>,
}

impl Banners {
  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  fn push(&self, event: &str) {
    self.events.lock().unwrap().push(event.to_string());
  }
}

impl Reporter for Banners {
  fn title(&self, _title: &str) {}

  fn start_long_process(&self, _title: &str) {
    self.push("start");
  }

  fn end_long_process(&self, _title: &str, _elapsed: Duration) {
    self.push("end");
  }

  fn success(&self, _message: &str) {
    self.push("success");
  }

  fn failure(&self, _message: &str) {
    self.push("failure");
  }
}
