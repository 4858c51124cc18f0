//! Registration point for extension-contributed tasks.

use std::sync::{Arc, RwLock};

use tracing::debug;

use super::BuildTask;

/// Tasks registered by one extension, in the order it gave them.
#[derive(Clone)]
pub struct TaskBatch {
  pub extension: String,
  pub tasks: Vec<Arc<dyn BuildTask>>,
}

impl std::fmt::Debug for TaskBatch {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TaskBatch")
      .field("extension", &self.extension)
      .field("tasks", &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>())
      .finish()
  }
}

/// Process-wide task registry.
///
/// Populated while extensions are wired up, then read once per run through
/// [`TaskSlot::snapshot`]. Registration is additive only.
#[derive(Debug, Default)]
pub struct TaskSlot {
  batches: RwLock<Vec<TaskBatch>>,
}

impl TaskSlot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&self, extension: impl Into<String>, tasks: Vec<Arc<dyn BuildTask>>) {
    let extension = extension.into();
    debug!(extension = %extension, tasks = tasks.len(), "registering tasks");
    self
      .batches
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .push(TaskBatch { extension, tasks });
  }

  /// Registered batches in registration order.
  pub fn snapshot(&self) -> Vec<TaskBatch> {
    self
      .batches
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clone()
  }

  /// Flattened tasks in registration order.
  pub fn tasks(&self) -> Vec<Arc<dyn BuildTask>> {
    self.snapshot().into_iter().flat_map(|b| b.tasks).collect()
  }

  pub fn is_empty(&self) -> bool {
    self
      .batches
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .iter()
      .all(|b| b.tasks.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::CmdTask;

  fn task(name: &str) -> Arc<dyn BuildTask> {
    Arc::new(CmdTask::new(name, "true"))
  }

  #[test]
  fn snapshot_preserves_registration_order() {
    let slot = TaskSlot::new();
    slot.register("linter", vec![task("lint"), task("format")]);
    slot.register("preview", vec![task("preview")]);

    let snapshot = slot.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].extension, "linter");
    assert_eq!(snapshot[1].extension, "preview");

    let names: Vec<String> = slot.tasks().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["lint", "format", "preview"]);
  }

  #[test]
  fn snapshot_is_detached_from_later_registrations() {
    let slot = TaskSlot::new();
    slot.register("linter", vec![task("lint")]);
    let before = slot.snapshot();

    slot.register("tester", vec![task("test")]);

    assert_eq!(before.len(), 1);
    assert_eq!(slot.snapshot().len(), 2);
  }

  #[test]
  fn empty_slot() {
    let slot = TaskSlot::new();
    assert!(slot.is_empty());
    slot.register("noop", vec![]);
    assert!(slot.is_empty());
  }
}
