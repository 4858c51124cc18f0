//! Component identities and the metadata the pipeline needs about them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identity of a component, e.g. `ui/button`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ComponentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ComponentId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for ComponentId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// A component under build.
///
/// `root_dir` is the component's source directory in the workspace; it is what
/// a capsule provider materializes into the isolated build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
  pub id: ComponentId,
  pub root_dir: PathBuf,
  #[serde(default)]
  pub dependencies: Vec<ComponentId>,
}

impl Component {
  pub fn new(id: impl Into<ComponentId>, root_dir: impl Into<PathBuf>) -> Self {
    Self {
      id: id.into(),
      root_dir: root_dir.into(),
      dependencies: Vec::new(),
    }
  }

  pub fn with_dependency(mut self, dependency: impl Into<ComponentId>) -> Self {
    self.dependencies.push(dependency.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn component_id_display() {
    assert_eq!(ComponentId::from("ui/button").to_string(), "ui/button");
  }

  #[test]
  fn component_builder_collects_dependencies() {
    let component = Component::new("ui/button", "components/button")
      .with_dependency("ui/theme")
      .with_dependency("ui/icons");

    assert_eq!(component.id.as_str(), "ui/button");
    assert_eq!(
      component.dependencies,
      vec![ComponentId::from("ui/theme"), ComponentId::from("ui/icons")]
    );
  }
}
