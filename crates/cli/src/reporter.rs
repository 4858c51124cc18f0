//! Console rendering of pipeline progress.

use std::time::Duration;

use pipewright_lib::pipeline::TaskResult;
use pipewright_lib::report::Reporter;

use crate::output::{format_duration, print_error, print_info, print_step, print_success, print_warning};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter {
  verbose: bool,
}

impl ConsoleReporter {
  pub fn new(verbose: bool) -> Self {
    Self { verbose }
  }
}

impl Reporter for ConsoleReporter {
  fn title(&self, _title: &str) {}

  fn start_long_process(&self, title: &str) {
    print_info(title);
  }

  fn end_long_process(&self, _title: &str, elapsed: Duration) {
    if self.verbose {
      print_info(&format!("finished in {}", format_duration(elapsed)));
    }
  }

  fn task_started(&self, index: usize, total: usize, task: &str) {
    print_step(index, total, task);
  }

  fn task_finished(&self, result: &TaskResult) {
    for component in result.components.iter().filter(|c| !c.is_success()) {
      for error in &component.errors {
        print_warning(&format!("{} [{}]: {}", result.task, component.component, error));
      }
    }
    if self.verbose {
      for component in &result.components {
        for artifact in &component.artifacts {
          print_info(&format!("{} [{}]: artifact '{}'", result.task, component.component, artifact.name));
        }
      }
    }
  }

  fn success(&self, message: &str) {
    print_success(message);
  }

  fn failure(&self, message: &str) {
    print_error(message);
  }
}
