//! Artifacts: named, immutable task outputs.
//!
//! Every task invocation gets its own [`ArtifactFactory`]. Names are unique per
//! (invocation, component); a second registration under the same name is
//! rejected and leaves the first artifact untouched.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::component::ComponentId;

/// A named output produced by a task for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub name: String,
  /// Task that produced the artifact.
  pub task: String,
  pub component: ComponentId,
  /// One or more output locations, usually inside the component's capsule.
  pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
  #[error("artifact '{name}' was already produced by task '{task}' for component {component}")]
  NameCollision {
    task: String,
    component: ComponentId,
    name: String,
  },

  #[error("artifact '{name}' of task '{task}' declares no outputs")]
  NoOutputs { task: String, name: String },
}

/// Creates artifacts for a single task invocation.
#[derive(Debug)]
pub struct ArtifactFactory {
  task: String,
  artifacts: Vec<Artifact>,
  seen: HashSet<(ComponentId, String)>,
  errors: Vec<(ComponentId, ArtifactError)>,
}

impl ArtifactFactory {
  pub fn new(task: impl Into<String>) -> Self {
    Self {
      task: task.into(),
      artifacts: Vec::new(),
      seen: HashSet::new(),
      errors: Vec::new(),
    }
  }

  /// Task this factory produces artifacts for.
  pub fn task(&self) -> &str {
    &self.task
  }

  /// Register an artifact for `component`.
  ///
  /// Failures are also kept on the factory so the executor can attach them to
  /// the offending component even when the task ignores the returned error.
  pub fn create(
    &mut self,
    component: &ComponentId,
    name: impl Into<String>,
    outputs: Vec<PathBuf>,
  ) -> Result<Artifact, ArtifactError> {
    let name = name.into();

    if outputs.is_empty() {
      return Err(self.reject(
        component,
        ArtifactError::NoOutputs {
          task: self.task.clone(),
          name,
        },
      ));
    }

    if !self.seen.insert((component.clone(), name.clone())) {
      return Err(self.reject(
        component,
        ArtifactError::NameCollision {
          task: self.task.clone(),
          component: component.clone(),
          name,
        },
      ));
    }

    let artifact = Artifact {
      name,
      task: self.task.clone(),
      component: component.clone(),
      outputs,
    };
    debug!(task = %self.task, component = %component, artifact = %artifact.name, "artifact recorded");
    self.artifacts.push(artifact.clone());
    Ok(artifact)
  }

  pub fn artifacts(&self) -> &[Artifact] {
    &self.artifacts
  }

  /// Rejected registrations, keyed by component.
  pub fn errors(&self) -> &[(ComponentId, ArtifactError)] {
    &self.errors
  }

  pub(crate) fn into_parts(self) -> (Vec<Artifact>, Vec<(ComponentId, ArtifactError)>) {
    (self.artifacts, self.errors)
  }

  fn reject(&mut self, component: &ComponentId, error: ArtifactError) -> ArtifactError {
    warn!(task = %self.task, component = %component, error = %error, "artifact rejected");
    self.errors.push((component.clone(), error.clone()));
    error
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn comp(id: &str) -> ComponentId {
    ComponentId::from(id)
  }

  #[test]
  fn create_records_artifact() {
    let mut factory = ArtifactFactory::new("compile");
    let artifact = factory
      .create(&comp("comp1"), "dist", vec![PathBuf::from("/capsules/comp1/dist")])
      .unwrap();

    assert_eq!(artifact.task, "compile");
    assert_eq!(artifact.component, comp("comp1"));
    assert_eq!(factory.artifacts(), &[artifact]);
    assert!(factory.errors().is_empty());
  }

  #[test]
  fn duplicate_name_for_same_component_collides_and_keeps_first() {
    let mut factory = ArtifactFactory::new("compile");
    factory
      .create(&comp("comp1"), "dist", vec![PathBuf::from("first")])
      .unwrap();

    let err = factory
      .create(&comp("comp1"), "dist", vec![PathBuf::from("second")])
      .unwrap_err();

    assert!(matches!(err, ArtifactError::NameCollision { ref name, .. } if name == "dist"));
    assert_eq!(factory.artifacts().len(), 1);
    assert_eq!(factory.artifacts()[0].outputs, vec![PathBuf::from("first")]);
    assert_eq!(factory.errors().len(), 1);
    assert_eq!(factory.errors()[0].0, comp("comp1"));
  }

  #[test]
  fn same_name_for_different_components_is_allowed() {
    let mut factory = ArtifactFactory::new("compile");
    factory.create(&comp("comp1"), "dist", vec![PathBuf::from("a")]).unwrap();
    factory.create(&comp("comp2"), "dist", vec![PathBuf::from("b")]).unwrap();

    assert_eq!(factory.artifacts().len(), 2);
    assert!(factory.errors().is_empty());
  }

  #[test]
  fn artifact_without_outputs_is_rejected() {
    let mut factory = ArtifactFactory::new("compile");
    let err = factory.create(&comp("comp1"), "dist", vec![]).unwrap_err();

    assert!(matches!(err, ArtifactError::NoOutputs { .. }));
    assert!(factory.artifacts().is_empty());

    // The name is still free after a rejected registration.
    factory.create(&comp("comp1"), "dist", vec![PathBuf::from("a")]).unwrap();
  }
}
