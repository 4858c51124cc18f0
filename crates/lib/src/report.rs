//! Progress reporting side channel.
//!
//! Reporters observe a run; nothing they do feeds back into control flow.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::pipeline::{RunState, TaskResult};

pub trait Reporter: Send + Sync {
  fn title(&self, title: &str);

  fn start_long_process(&self, title: &str);

  fn end_long_process(&self, title: &str, elapsed: Duration);

  /// The run identified by `run_id` entered `state`.
  fn state_changed(&self, _run_id: &str, _state: RunState) {}

  fn task_started(&self, _index: usize, _total: usize, _task: &str) {}

  fn task_finished(&self, _result: &TaskResult) {}

  fn success(&self, message: &str);

  fn failure(&self, message: &str);
}

/// Routes every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn title(&self, title: &str) {
    info!(title = %title, "run");
  }

  fn start_long_process(&self, title: &str) {
    info!(title = %title, "started");
  }

  fn end_long_process(&self, title: &str, elapsed: Duration) {
    info!(title = %title, elapsed_ms = elapsed.as_millis() as u64, "finished");
  }

  fn state_changed(&self, run_id: &str, state: RunState) {
    info!(run = %run_id, state = ?state, "run state");
  }

  fn task_started(&self, index: usize, total: usize, task: &str) {
    info!(task = %task, step = index + 1, total, "running task");
  }

  fn task_finished(&self, result: &TaskResult) {
    let failed = result.components.iter().filter(|c| !c.is_success()).count();
    if failed > 0 {
      warn!(task = %result.task, failed, "task finished with errors");
    } else {
      info!(task = %result.task, components = result.components.len(), "task finished");
    }
  }

  fn success(&self, message: &str) {
    info!("{}", message);
  }

  fn failure(&self, message: &str) {
    error!("{}", message);
  }
}
