mod capsules;
mod plan;
mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use pipewright_lib::config::{ResolvedWorkspace, WorkspaceConfig, find_config_from};
use pipewright_lib::consts::CONFIG_FILENAME;

pub use capsules::cmd_capsules;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// Locate, load and resolve the workspace config.
///
/// Without an explicit path the config is searched upwards from the current
/// directory. Relative paths inside it resolve against its directory.
pub(crate) fn load_workspace(config: Option<&Path>) -> Result<(PathBuf, ResolvedWorkspace)> {
  let path = match config {
    Some(path) => path.to_path_buf(),
    None => {
      let cwd = std::env::current_dir().context("Failed to read current directory")?;
      find_config_from(&cwd).ok_or_else(|| anyhow!("No {} found in {} or its parents", CONFIG_FILENAME, cwd.display()))?
    }
  };

  let path = dunce::canonicalize(&path).with_context(|| format!("Config file not found: {}", path.display()))?;
  let config = WorkspaceConfig::load(&path).with_context(|| format!("Failed to load config: {}", path.display()))?;
  let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
  let workspace = config
    .resolve(&base_dir)
    .with_context(|| format!("Failed to resolve workspace: {}", path.display()))?;

  Ok((path, workspace))
}
