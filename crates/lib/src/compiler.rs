//! Compiler contract used by compile tasks.
//!
//! Compilers turn component sources into dists, either one file at a time
//! (`transpile_file`) or for every capsule of a run (`build`). Packaging
//! concerns are optional capabilities a compiler may expose.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::artifact::ArtifactFactory;
use crate::context::BuildContext;
use crate::pipeline::BuiltTaskResult;
use crate::task::{BuildTask, TaskLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOpts {
  /// Absolute path of the component's root directory.
  pub component_dir: PathBuf,
  /// Path of the file relative to `component_dir`.
  pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOutput {
  pub output_text: String,
  /// Relative to the component's dist directory.
  pub output_path: PathBuf,
}

/// Files the compiler generates that must not end up in the package.
pub trait PackageIgnore {
  fn npm_ignore_entries(&self) -> Vec<String>;
}

/// Last chance to edit the package manifest before it is published.
pub trait PublishManifestHook {
  fn change_package_json_before_publish(&self, package_json: &mut Value);
}

#[async_trait]
pub trait Compiler: Send + Sync {
  /// Transpile a single file. `None` when the file produces no output.
  fn transpile_file(&self, content: &str, opts: &TranspileOpts) -> Option<Vec<TranspileOutput>>;

  /// Compile every component of the run inside its capsule, registering the
  /// dists as artifacts named `artifact_name`.
  async fn build(&self, ctx: &mut BuildContext, artifacts: &mut ArtifactFactory, artifact_name: &str)
  -> BuiltTaskResult;

  /// Dist directory relative to the capsule, e.g. `dist`.
  fn dist_dir(&self) -> PathBuf;

  /// Dist counterpart of a relative source path, e.g. `index.ts` to `dist/index.js`.
  fn dist_path_by_src_path(&self, src_path: &Path) -> PathBuf;

  /// Unsupported files are copied to the dist directory unchanged.
  fn is_file_supported(&self, file_path: &Path) -> bool;

  fn as_package_ignore(&self) -> Option<&dyn PackageIgnore> {
    None
  }

  fn as_publish_hook(&self) -> Option<&dyn PublishManifestHook> {
    None
  }
}

/// Ignore entries of `compiler`, empty when it has none.
pub fn npm_ignore_entries(compiler: &dyn Compiler) -> Vec<String> {
  compiler
    .as_package_ignore()
    .map(|c| c.npm_ignore_entries())
    .unwrap_or_default()
}

/// Let `compiler` edit `package_json`; a no-op when it has no hook.
pub fn prepare_publish_manifest(compiler: &dyn Compiler, package_json: &mut Value) {
  if let Some(hook) = compiler.as_publish_hook() {
    hook.change_package_json_before_publish(package_json);
  }
}

/// Runs a [`Compiler`] as a pipeline task.
pub struct CompilerTask {
  name: String,
  artifact_name: String,
  location: Option<TaskLocation>,
  compiler: Arc<dyn Compiler>,
}

impl CompilerTask {
  pub fn new(name: impl Into<String>, compiler: Arc<dyn Compiler>) -> Self {
    Self {
      name: name.into(),
      artifact_name: "dist".to_string(),
      location: None,
      compiler,
    }
  }

  pub fn with_artifact_name(mut self, artifact_name: impl Into<String>) -> Self {
    self.artifact_name = artifact_name.into();
    self
  }

  pub fn at(mut self, location: TaskLocation) -> Self {
    self.location = Some(location);
    self
  }

  pub fn compiler(&self) -> &dyn Compiler {
    self.compiler.as_ref()
  }
}

#[async_trait]
impl BuildTask for CompilerTask {
  fn name(&self) -> &str {
    &self.name
  }

  fn location(&self) -> Option<TaskLocation> {
    self.location
  }

  async fn execute(&self, ctx: &mut BuildContext, artifacts: &mut ArtifactFactory) -> BuiltTaskResult {
    debug!(task = %self.name, artifact = %self.artifact_name, "running compiler");
    self.compiler.build(ctx, artifacts, &self.artifact_name).await
  }
}
