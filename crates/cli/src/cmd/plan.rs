//! Implementation of the `pw plan` command.
//!
//! Prints the ordered task list each environment would run, without
//! provisioning capsules or executing anything.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use pipewright_lib::pipeline::{BuildPipe, Environment, PipeKind};
use pipewright_lib::task::TaskLocation;

use crate::cmd::load_workspace;
use crate::output::{print_error, print_info, print_json, print_step};

pub fn cmd_plan(config: Option<&Path>, kind: PipeKind, json: bool) -> Result<bool> {
  let (_, workspace) = load_workspace(config)?;
  let slot = workspace.slot(kind);

  let mut success = true;
  let mut plans = Vec::new();

  for (id, env) in &workspace.environments {
    let components: Vec<String> = workspace.components_for(id).iter().map(|c| c.id.to_string()).collect();

    match BuildPipe::from_environment(&slot, env.as_ref() as &dyn Environment, kind) {
      Ok(pipe) => {
        let tasks: Vec<_> = pipe
          .tasks()
          .iter()
          .map(|t| json!({ "name": t.name(), "location": t.location().unwrap_or(TaskLocation::Start) }))
          .collect();

        if !json {
          print_info(&format!(
            "{} pipe for environment {} ({} component(s))",
            kind,
            id,
            components.len()
          ));
          for (index, name) in pipe.task_names().iter().enumerate() {
            print_step(index, pipe.len(), name);
          }
        }
        plans.push(json!({ "env": id, "pipe": kind.as_str(), "components": components, "tasks": tasks }));
      }
      Err(e) => {
        success = false;
        if !json {
          print_error(&format!("{}: {}", id, e));
        }
        plans.push(json!({ "env": id, "pipe": kind.as_str(), "error": e.to_string() }));
      }
    }
  }

  if json {
    print_json(&plans)?;
  }

  Ok(success)
}
