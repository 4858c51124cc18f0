//! Run-scoped contexts handed to the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::capsule::{Capsule, CapsuleGraph};
use crate::component::{Component, ComponentId};
use crate::pipeline::Environment;

/// Identity and inputs of one run: the environment and its components.
#[derive(Clone)]
pub struct ExecutionContext {
  /// Environment id; doubles as the run's display id.
  pub id: String,
  /// Unique per run.
  pub run_id: String,
  pub env: Arc<dyn Environment>,
  pub components: Vec<Component>,
}

impl ExecutionContext {
  pub fn new(env: Arc<dyn Environment>, components: Vec<Component>) -> Self {
    Self {
      id: env.id().to_string(),
      run_id: Uuid::new_v4().to_string(),
      env,
      components,
    }
  }

  pub fn component_ids(&self) -> Vec<ComponentId> {
    self.components.iter().map(|c| c.id.clone()).collect()
  }
}

impl fmt::Debug for ExecutionContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutionContext")
      .field("id", &self.id)
      .field("run_id", &self.run_id)
      .field("components", &self.component_ids())
      .finish()
  }
}

/// Shared state every task of a run reads and augments.
///
/// Passed to one task at a time by `&mut`. Tasks may attach data for later
/// tasks but must leave `components` as they found it.
pub struct BuildContext {
  pub run_id: String,
  pub env_id: String,
  pub env: Arc<dyn Environment>,
  pub components: Vec<Component>,
  pub capsule_graph: CapsuleGraph,
  data: BTreeMap<String, Value>,
}

impl BuildContext {
  pub fn new(exec: ExecutionContext, capsule_graph: CapsuleGraph) -> Self {
    Self {
      run_id: exec.run_id,
      env_id: exec.id,
      env: exec.env,
      components: exec.components,
      capsule_graph,
      data: BTreeMap::new(),
    }
  }

  pub fn component_ids(&self) -> Vec<ComponentId> {
    self.components.iter().map(|c| c.id.clone()).collect()
  }

  pub fn component(&self, id: &ComponentId) -> Option<&Component> {
    self.components.iter().find(|c| &c.id == id)
  }

  pub fn capsule(&self, id: &ComponentId) -> Option<&Capsule> {
    self.capsule_graph.get(id)
  }

  /// Component ids with every dependency ahead of its dependents.
  ///
  /// Independent components keep context order. A dependency cycle falls back
  /// to context order entirely.
  pub fn components_in_build_order(&self) -> Vec<ComponentId> {
    let ids = self.component_ids();
    let Some(order) = self.capsule_graph.build_order() else {
      warn!(env = %self.env_id, "dependency cycle between components, using declared order");
      return ids;
    };

    let mut ordered: Vec<ComponentId> = order.into_iter().filter(|id| ids.contains(id)).cloned().collect();
    let rest: Vec<ComponentId> = ids.into_iter().filter(|id| !ordered.contains(id)).collect();
    ordered.extend(rest);
    ordered
  }

  /// Attach data under `key` for later tasks.
  ///
  /// Attached data is append-only: returns false and keeps the existing value
  /// if `key` is already taken.
  pub fn attach(&mut self, key: impl Into<String>, value: Value) -> bool {
    let key = key.into();
    if self.data.contains_key(&key) {
      return false;
    }
    self.data.insert(key, value);
    true
  }

  pub fn data(&self, key: &str) -> Option<&Value> {
    self.data.get(key)
  }

  pub fn into_components(self) -> Vec<Component> {
    self.components
  }
}

impl fmt::Debug for BuildContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildContext")
      .field("run_id", &self.run_id)
      .field("env_id", &self.env_id)
      .field("components", &self.component_ids())
      .field("capsules", &self.capsule_graph.len())
      .field("data", &self.data.keys().collect::<Vec<_>>())
      .finish()
  }
}
