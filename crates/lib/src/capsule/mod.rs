//! Isolated build contexts ("capsules").
//!
//! A [`CapsuleProvider`] turns a set of component identities into a
//! [`CapsuleGraph`]: one capsule per component, linked by component
//! dependencies. The pipeline only relies on two properties of a provider:
//! create-or-reuse, and one capsule per component identity.
//!
//! # Submodules
//!
//! - [`fs`] - Provider materializing capsules as directories on disk

pub mod fs;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::component::ComponentId;
use crate::util::hash::DirHashError;

pub use fs::FsCapsuleProvider;

/// The isolated build context of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capsule {
  pub component: ComponentId,
  pub path: PathBuf,
  /// True when an existing capsule was handed back as-is.
  pub reused: bool,
}

/// Options for [`CapsuleProvider::create_network`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkOptions {
  /// Return existing capsules unchanged instead of recreating them.
  pub reuse_existing: bool,
}

impl NetworkOptions {
  pub fn reuse_existing() -> Self {
    Self { reuse_existing: true }
  }
}

#[derive(Debug, Error)]
pub enum CapsuleError {
  #[error("component {0} is not known to the capsule provider")]
  UnknownComponent(ComponentId),

  #[error("failed to materialize capsule for {component}: {source}")]
  Materialize {
    component: ComponentId,
    #[source]
    source: io::Error,
  },

  #[error("failed to hash capsule of {component}: {source}")]
  Hash {
    component: ComponentId,
    #[source]
    source: DirHashError,
  },

  #[error("failed to access capsule marker {}: {source}", path.display())]
  MarkerIo {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid capsule marker {}: {message}", path.display())]
  Marker { path: PathBuf, message: String },

  #[error("capsule provider failed: {0}")]
  Provider(String),
}

/// Source of isolated build contexts.
///
/// Implementations must support concurrent calls for disjoint component sets.
#[async_trait]
pub trait CapsuleProvider: Send + Sync {
  async fn create_network(&self, ids: &[ComponentId], options: &NetworkOptions) -> Result<CapsuleGraph, CapsuleError>;
}

/// Capsules of one run, with an edge from each dependency to its dependents.
#[derive(Debug, Clone, Default)]
pub struct CapsuleGraph {
  graph: DiGraph<Capsule, ()>,
  nodes: HashMap<ComponentId, NodeIndex>,
}

impl CapsuleGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a capsule. A capsule already present for the same component is kept.
  pub fn add(&mut self, capsule: Capsule) -> bool {
    if self.nodes.contains_key(&capsule.component) {
      return false;
    }
    let id = capsule.component.clone();
    let idx = self.graph.add_node(capsule);
    self.nodes.insert(id, idx);
    true
  }

  /// Record that `dependent` depends on `dependency`. Both must be present.
  pub fn link(&mut self, dependency: &ComponentId, dependent: &ComponentId) -> bool {
    match (self.nodes.get(dependency), self.nodes.get(dependent)) {
      (Some(&from), Some(&to)) => {
        self.graph.update_edge(from, to, ());
        true
      }
      _ => false,
    }
  }

  pub fn get(&self, id: &ComponentId) -> Option<&Capsule> {
    self.nodes.get(id).map(|&idx| &self.graph[idx])
  }

  pub fn contains(&self, id: &ComponentId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  /// Capsules in insertion order.
  pub fn capsules(&self) -> impl Iterator<Item = &Capsule> {
    self.graph.node_weights()
  }

  /// Requested ids that have no capsule in this graph.
  pub fn missing(&self, ids: &[ComponentId]) -> Vec<ComponentId> {
    ids.iter().filter(|id| !self.contains(id)).cloned().collect()
  }

  /// Direct dependencies of `id` that are part of this graph.
  pub fn dependencies(&self, id: &ComponentId) -> Vec<&ComponentId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut deps: Vec<&ComponentId> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|n| &self.graph[n].component)
      .collect();
    deps.sort();
    deps
  }

  /// Components ordered so every dependency precedes its dependents.
  ///
  /// Returns `None` if the dependency edges form a cycle.
  pub fn build_order(&self) -> Option<Vec<&ComponentId>> {
    let sorted = toposort(&self.graph, None).ok()?;
    Some(sorted.into_iter().map(|idx| &self.graph[idx].component).collect())
  }
}
