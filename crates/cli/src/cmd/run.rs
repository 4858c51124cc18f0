//! Implementation of the `pw build` and `pw deploy` commands.
//!
//! Runs the selected pipe once per environment, over the components declared
//! for it, and prints a summary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use pipewright_lib::capsule::{FsCapsuleProvider, NetworkOptions};
use pipewright_lib::pipeline::PipeKind;
use pipewright_lib::report::{Reporter, TracingReporter};
use pipewright_lib::service::{BuildServiceResults, BuilderService};

use crate::cmd::load_workspace;
use crate::output::{print_error, print_json, print_stat, print_success};
use crate::reporter::ConsoleReporter;

/// JSON view of one environment's run.
#[derive(Serialize)]
#[serde(untagged)]
enum RunReport {
  Finished(BuildServiceResults),
  Failed { id: String, error: String },
}

/// Execute a pipe for every environment. Returns false if any run failed.
pub fn cmd_run(config: Option<&Path>, kind: PipeKind, no_reuse: bool, verbose: bool, json: bool) -> Result<bool> {
  let (path, workspace) = load_workspace(config)?;
  info!(config = %path.display(), pipe = %kind, "running pipe");

  let provider = Arc::new(FsCapsuleProvider::new(
    workspace.capsules_dir.clone(),
    workspace.components().cloned(),
  ));
  let reporter: Arc<dyn Reporter> = if json {
    Arc::new(TracingReporter)
  } else {
    Arc::new(ConsoleReporter::new(verbose))
  };
  let options = NetworkOptions {
    reuse_existing: workspace.reuse_capsules && !no_reuse,
  };
  let service = BuilderService::new(workspace.slot(kind), provider, kind)
    .with_reporter(reporter)
    .with_network_options(options);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let mut reports = Vec::new();
  let mut success = true;

  for exec in workspace.execution_contexts() {
    let id = exec.id.clone();
    match rt.block_on(service.run(exec)) {
      Ok(results) => {
        success &= results.is_success();
        reports.push(RunReport::Finished(results));
      }
      Err(e) => {
        success = false;
        reports.push(RunReport::Failed { id, error: e.to_string() });
      }
    }
  }

  if json {
    print_json(&reports)?;
    return Ok(success);
  }

  println!();
  if reports.is_empty() {
    print_success("No components to run");
    return Ok(true);
  }

  for report in &reports {
    match report {
      RunReport::Finished(results) => print_summary(results),
      RunReport::Failed { id, error } => print_error(&format!("{}: {}", id, error)),
    }
  }

  Ok(success)
}

fn print_summary(results: &BuildServiceResults) {
  let failed = results.build_results.failed_components();
  let line = format!(
    "{}: {} task(s), {} component(s)",
    results.id,
    results.build_results.len(),
    results.components.len()
  );
  if results.is_success() {
    print_success(&line);
  } else {
    print_error(&line);
  }

  let artifacts: usize = results
    .components
    .iter()
    .map(|c| results.build_results.artifacts_for(&c.id).len())
    .sum();
  print_stat("Artifacts", &artifacts.to_string());
  if !failed.is_empty() {
    let ids: Vec<&str> = failed.iter().map(|id| id.as_str()).collect();
    print_stat("Failed", &ids.join(", "));
  }
  for error in &results.errors {
    print_stat("Aborted", &error.to_string());
  }
}
