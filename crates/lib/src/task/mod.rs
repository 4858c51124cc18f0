//! Build tasks and the slot extensions register them through.
//!
//! # Submodules
//!
//! - [`cmd`] - Task running a shell command inside every capsule

pub mod cmd;
mod slot;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactFactory;
use crate::context::BuildContext;
use crate::pipeline::BuiltTaskResult;

pub use cmd::{CmdArtifact, CmdError, CmdTask};
pub use slot::{TaskBatch, TaskSlot};

/// Where a registered task sits relative to the environment's own tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLocation {
  /// Before all environment tasks. Also the default for tasks that declare nothing.
  Start,
  /// After all environment tasks.
  End,
}

impl TaskLocation {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskLocation::Start => "start",
      TaskLocation::End => "end",
    }
  }
}

impl fmt::Display for TaskLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task location '{0}', expected 'start' or 'end'")]
pub struct UnknownLocation(pub String);

impl FromStr for TaskLocation {
  type Err = UnknownLocation;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "start" => Ok(TaskLocation::Start),
      "end" => Ok(TaskLocation::End),
      other => Err(UnknownLocation(other.to_string())),
    }
  }
}

/// A unit of work run once per pipeline against all components of the run.
///
/// Tasks receive the shared build context by mutable reference so they can
/// attach data for later tasks. They must not remove or replace components;
/// the executor aborts the run if they do.
#[async_trait]
pub trait BuildTask: Send + Sync {
  /// Unique task name.
  fn name(&self) -> &str;

  /// Declared position; `None` is treated as [`TaskLocation::Start`].
  fn location(&self) -> Option<TaskLocation> {
    None
  }

  async fn execute(&self, ctx: &mut BuildContext, artifacts: &mut ArtifactFactory) -> BuiltTaskResult;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_parses_known_values() {
    assert_eq!("start".parse::<TaskLocation>().unwrap(), TaskLocation::Start);
    assert_eq!("end".parse::<TaskLocation>().unwrap(), TaskLocation::End);
    assert_eq!(
      "middle".parse::<TaskLocation>().unwrap_err(),
      UnknownLocation("middle".to_string())
    );
  }

  #[test]
  fn location_display_round_trips() {
    for location in [TaskLocation::Start, TaskLocation::End] {
      assert_eq!(location.to_string().parse::<TaskLocation>().unwrap(), location);
    }
  }
}
