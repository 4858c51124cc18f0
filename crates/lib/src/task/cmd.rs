//! Shell command task.
//!
//! Runs one command per component with the component's capsule as working
//! directory, visiting dependencies before their dependents. A non-zero exit
//! is recorded as an error for that component only; a task marked `fatal`
//! turns any such failure into a pipeline abort.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use super::{BuildTask, TaskLocation};
use crate::artifact::ArtifactFactory;
use crate::component::ComponentId;
use crate::context::BuildContext;
use crate::pipeline::BuiltTaskResult;

/// Artifact a command task registers after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CmdArtifact {
  pub name: String,
  /// Output paths relative to the capsule directory.
  pub paths: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to spawn '{cmd}': {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: io::Error,
  },

  #[error("command failed with exit code {code:?}: {cmd}{}", format_stderr(.stderr))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr: String,
  },
}

fn format_stderr(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{}", trimmed)
  }
}

#[derive(Debug, Clone)]
pub struct CmdTask {
  name: String,
  cmd: String,
  location: Option<TaskLocation>,
  fatal: bool,
  env: BTreeMap<String, String>,
  artifacts: Vec<CmdArtifact>,
  shell: Option<String>,
}

impl CmdTask {
  pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      cmd: cmd.into(),
      location: None,
      fatal: false,
      env: BTreeMap::new(),
      artifacts: Vec::new(),
      shell: None,
    }
  }

  pub fn at(mut self, location: TaskLocation) -> Self {
    self.location = Some(location);
    self
  }

  pub fn fatal(mut self, fatal: bool) -> Self {
    self.fatal = fatal;
    self
  }

  pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn with_artifact(mut self, artifact: CmdArtifact) -> Self {
    self.artifacts.push(artifact);
    self
  }

  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  pub fn cmd(&self) -> &str {
    &self.cmd
  }

  pub fn is_fatal(&self) -> bool {
    self.fatal
  }

  /// Register declared artifacts, recording missing outputs as errors.
  fn register_artifacts(
    &self,
    component: &ComponentId,
    capsule: &Path,
    factory: &mut ArtifactFactory,
    result: &mut BuiltTaskResult,
  ) {
    for artifact in &self.artifacts {
      let outputs: Vec<PathBuf> = artifact.paths.iter().map(|p| capsule.join(p)).collect();
      if let Some(missing) = outputs.iter().find(|p| !p.exists()) {
        result.record_error(
          component,
          format!("artifact '{}' output missing: {}", artifact.name, missing.display()),
        );
        continue;
      }
      // Rejections are kept by the factory and attached to the component.
      let _ = factory.create(component, &artifact.name, outputs);
    }
  }
}

#[async_trait]
impl BuildTask for CmdTask {
  fn name(&self) -> &str {
    &self.name
  }

  fn location(&self) -> Option<TaskLocation> {
    self.location
  }

  async fn execute(&self, ctx: &mut BuildContext, artifacts: &mut ArtifactFactory) -> BuiltTaskResult {
    let mut result = BuiltTaskResult::success();

    let targets: Vec<(ComponentId, Option<PathBuf>, String)> = ctx
      .components_in_build_order()
      .into_iter()
      .map(|id| {
        let capsule = ctx.capsule(&id).map(|capsule| capsule.path.clone());
        let dependencies: Vec<&str> = ctx.capsule_graph.dependencies(&id).into_iter().map(|d| d.as_str()).collect();
        let dependencies = dependencies.join(",");
        (id, capsule, dependencies)
      })
      .collect();

    for (id, capsule, dependencies) in targets {
      let Some(capsule) = capsule else {
        result.record_error(&id, format!("no capsule for component {}", id));
        continue;
      };

      let mut env = self.env.clone();
      env.insert("PIPEWRIGHT_COMPONENT".to_string(), id.to_string());
      env.insert("PIPEWRIGHT_DEPENDENCIES".to_string(), dependencies);
      env.insert("PIPEWRIGHT_TASK".to_string(), self.name.clone());
      env.insert("PIPEWRIGHT_RUN".to_string(), ctx.run_id.clone());

      match run_in_capsule(&self.cmd, &capsule, &env, self.shell.as_deref()).await {
        Ok(_) => self.register_artifacts(&id, &capsule, artifacts, &mut result),
        Err(e) => result.record_error(&id, e.to_string()),
      }
    }

    if self.fatal && result.has_errors() {
      result.pipeline_fatal = true;
    }
    result
  }
}

/// Parent variables a command still sees after the environment is cleared.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "USER", "SYSTEMROOT", "TMPDIR", "TMP", "TEMP"];

/// Run `cmd` through the shell with `capsule` as working directory.
///
/// The parent environment is cleared except for [`PASSTHROUGH_ENV`]. A C
/// locale, a fixed `SOURCE_DATE_EPOCH`, `PIPEWRIGHT_CAPSULE` and the entries
/// of `env` are set on top. Returns trimmed stdout.
pub async fn run_in_capsule(
  cmd: &str,
  capsule: &Path,
  env: &BTreeMap<String, String>,
  shell: Option<&str>,
) -> Result<String, CmdError> {
  info!(cmd = %cmd, capsule = ?capsule, "executing command");

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command.args(&shell_args).arg(cmd).current_dir(capsule).env_clear();

  for key in PASSTHROUGH_ENV {
    if let Some(value) = std::env::var_os(key) {
      command.env(key, value);
    }
  }

  command
    .env("LANG", "C")
    .env("LC_ALL", "C")
    // 1980-01-01T00:00:00Z, the ZIP epoch
    .env("SOURCE_DATE_EPOCH", "315532800")
    .env("PIPEWRIGHT_CAPSULE", capsule)
    .envs(env);

  debug!(shell = %shell_cmd, "spawning process");

  let output = command.output().await.map_err(|source| CmdError::Spawn {
    cmd: cmd.to_string(),
    source,
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(CmdError::Failed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr,
    });
  }

  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(stdout)
}

/// Shell binary and the flag that passes it a command string.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec!["-NoProfile".to_string(), "-Command".to_string()],
    )
  }
}
