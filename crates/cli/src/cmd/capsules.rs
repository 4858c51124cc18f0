//! Implementation of the `pw capsules` command.
//!
//! Lists capsule directories under the workspace's capsules root together with
//! the component and content hash recorded in their markers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use pipewright_lib::capsule::fs::read_capsule_marker;

use crate::cmd::load_workspace;
use crate::output::{print_info, print_json, print_stat, print_warning, symbols, truncate_hash};

pub fn cmd_capsules(config: Option<&Path>, json: bool) -> Result<()> {
  let (_, workspace) = load_workspace(config)?;
  let root = &workspace.capsules_dir;

  let mut entries = Vec::new();
  if root.is_dir() {
    for entry in fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))? {
      let entry = entry.with_context(|| format!("Failed to read {}", root.display()))?;
      if entry.path().is_dir() {
        entries.push(entry.path());
      }
    }
  }
  entries.sort();

  if json {
    let items: Vec<_> = entries
      .iter()
      .map(|path| match read_capsule_marker(path) {
        Ok(Some(marker)) => json!({
          "path": path,
          "component": marker.component,
          "content_hash": marker.content_hash,
        }),
        Ok(None) => json!({ "path": path, "incomplete": true }),
        Err(e) => json!({ "path": path, "error": e.to_string() }),
      })
      .collect();
    return print_json(&json!({ "root": root, "capsules": items }));
  }

  if entries.is_empty() {
    print_info(&format!("No capsules in {}", root.display()));
    return Ok(());
  }

  print_info(&format!("Capsules in {}", root.display()));
  print_stat("Count", &entries.len().to_string());
  println!();

  for path in &entries {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    match read_capsule_marker(path) {
      Ok(Some(marker)) => println!(
        "  {} {} ({})",
        symbols::INFO,
        marker.component,
        truncate_hash(&marker.content_hash)
      ),
      Ok(None) => print_warning(&format!("{}: incomplete capsule", name)),
      Err(e) => print_warning(&format!("{}: {}", name, e)),
    }
  }

  Ok(())
}
