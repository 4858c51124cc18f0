//! Workspace configuration (`pipewright.toml`).
//!
//! The file declares components, the environments they build in, and the
//! extensions contributing tasks:
//!
//! ```toml
//! [[components]]
//! id = "ui/button"
//! path = "components/button"
//! env = "node"
//!
//! [environments.node]
//! build = [{ name = "compile", run = "make" }]
//!
//! [[extensions]]
//! name = "linter"
//! tasks = [{ name = "lint", run = "lint .", location = "start" }]
//! ```
//!
//! Parsing checks shape only; [`WorkspaceConfig::validate`] checks references
//! and names, and [`WorkspaceConfig::resolve`] wires everything into runtime
//! objects.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::component::{Component, ComponentId};
use crate::consts::CONFIG_FILENAME;
use crate::context::ExecutionContext;
use crate::pipeline::{Environment, PipeKind, StaticEnvironment, TaskList, UnknownPipe};
use crate::platform::paths;
use crate::task::{BuildTask, CmdArtifact, CmdTask, TaskLocation, TaskSlot, UnknownLocation};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse pipewright.toml: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("component '{0}' is declared more than once")]
  DuplicateComponent(String),

  #[error("component '{component}' uses undeclared environment '{env}'")]
  UnknownEnvironment { component: String, env: String },

  #[error("component '{component}' depends on undeclared component '{dependency}'")]
  UnknownDependency { component: String, dependency: String },

  #[error("task '{task}': {source}")]
  UnknownLocation {
    task: String,
    #[source]
    source: UnknownLocation,
  },

  #[error("extension '{extension}': {source}")]
  UnknownPipe {
    extension: String,
    #[source]
    source: UnknownPipe,
  },

  #[error("task '{task}' appears more than once in the {pipe} pipe of environment '{env}'")]
  DuplicateTask { env: String, pipe: PipeKind, task: String },
}

fn default_reuse() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
  /// Where capsules are materialized, relative to the config file.
  #[serde(default)]
  pub capsules_dir: Option<PathBuf>,

  #[serde(default = "default_reuse")]
  pub reuse_capsules: bool,

  #[serde(default)]
  pub components: Vec<ComponentConfig>,

  #[serde(default)]
  pub environments: BTreeMap<String, EnvironmentConfig>,

  #[serde(default)]
  pub extensions: Vec<ExtensionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
  pub id: String,
  pub path: PathBuf,
  pub env: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
  #[serde(default)]
  pub build: Option<Vec<TaskConfig>>,
  #[serde(default)]
  pub deploy: Option<Vec<TaskConfig>>,
  /// Retired combined pipe. Declaring it, even empty, rejects every run.
  #[serde(default)]
  pub legacy: Option<Vec<TaskConfig>>,
}

impl EnvironmentConfig {
  fn pipe(&self, kind: PipeKind) -> Option<&Vec<TaskConfig>> {
    match kind {
      PipeKind::Build => self.build.as_ref(),
      PipeKind::Deploy => self.deploy.as_ref(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionConfig {
  pub name: String,
  /// Pipes the tasks join; all pipes when empty.
  #[serde(default)]
  pub pipes: Vec<String>,
  #[serde(default)]
  pub tasks: Vec<TaskConfig>,
}

impl ExtensionConfig {
  fn joins(&self, kind: PipeKind) -> bool {
    self.pipes.is_empty() || self.pipes.iter().any(|p| p == kind.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
  pub name: String,
  pub run: String,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub fatal: bool,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
  #[serde(default)]
  pub artifacts: Vec<CmdArtifact>,
  #[serde(default)]
  pub shell: Option<String>,
}

impl TaskConfig {
  fn location(&self) -> Result<Option<TaskLocation>, ConfigError> {
    self
      .location
      .as_deref()
      .map(str::parse::<TaskLocation>)
      .transpose()
      .map_err(|source| ConfigError::UnknownLocation {
        task: self.name.clone(),
        source,
      })
  }

  fn to_task(&self) -> Result<Arc<dyn BuildTask>, ConfigError> {
    let mut task = CmdTask::new(&self.name, &self.run).fatal(self.fatal);
    if let Some(location) = self.location()? {
      task = task.at(location);
    }
    for (key, value) in &self.env {
      task = task.with_env(key, value);
    }
    for artifact in &self.artifacts {
      task = task.with_artifact(artifact.clone());
    }
    if let Some(shell) = &self.shell {
      task = task.with_shell(shell);
    }
    Ok(Arc::new(task))
  }
}

fn to_tasks(configs: &[TaskConfig]) -> Result<TaskList, ConfigError> {
  configs.iter().map(TaskConfig::to_task).collect()
}

/// Find the config file by walking up from `start`.
pub fn find_config_from(start: &Path) -> Option<PathBuf> {
  start
    .ancestors()
    .map(|dir| dir.join(CONFIG_FILENAME))
    .find(|path| path.is_file())
}

impl WorkspaceConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    debug!(path = ?path, "loading config");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content)
  }

  /// Parse and validate.
  pub fn parse(content: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut ids = HashSet::new();
    for component in &self.components {
      if !ids.insert(component.id.as_str()) {
        return Err(ConfigError::DuplicateComponent(component.id.clone()));
      }
      if !self.environments.contains_key(&component.env) {
        return Err(ConfigError::UnknownEnvironment {
          component: component.id.clone(),
          env: component.env.clone(),
        });
      }
    }

    for component in &self.components {
      if let Some(dependency) = component.dependencies.iter().find(|d| !ids.contains(d.as_str())) {
        return Err(ConfigError::UnknownDependency {
          component: component.id.clone(),
          dependency: dependency.clone(),
        });
      }
    }

    for extension in &self.extensions {
      for pipe in &extension.pipes {
        pipe.parse::<PipeKind>().map_err(|source| ConfigError::UnknownPipe {
          extension: extension.name.clone(),
          source,
        })?;
      }
    }

    let all_tasks = self
      .extensions
      .iter()
      .flat_map(|e| e.tasks.iter())
      .chain(self.environments.values().flat_map(|env| {
        [&env.build, &env.deploy, &env.legacy]
          .into_iter()
          .flatten()
          .flat_map(|tasks| tasks.iter())
      }));
    for task in all_tasks {
      task.location()?;
    }

    for (env_id, env) in &self.environments {
      for kind in [PipeKind::Build, PipeKind::Deploy] {
        let mut seen = HashSet::new();
        let names = self
          .extensions
          .iter()
          .filter(|e| e.joins(kind))
          .flat_map(|e| e.tasks.iter())
          .chain(env.pipe(kind).into_iter().flatten())
          .map(|t| t.name.as_str());
        for name in names {
          if !seen.insert(name) {
            return Err(ConfigError::DuplicateTask {
              env: env_id.clone(),
              pipe: kind,
              task: name.to_string(),
            });
          }
        }
      }
    }

    Ok(())
  }

  /// Build runtime objects. Relative paths are resolved against `base_dir`.
  pub fn resolve(&self, base_dir: &Path) -> Result<ResolvedWorkspace, ConfigError> {
    let components: Vec<(String, Component)> = self
      .components
      .iter()
      .map(|c| {
        let mut component = Component::new(c.id.as_str(), base_dir.join(&c.path));
        component.dependencies = c.dependencies.iter().map(|d| ComponentId::from(d.as_str())).collect();
        (c.env.clone(), component)
      })
      .collect();

    let mut environments = BTreeMap::new();
    for (id, env) in &self.environments {
      let mut resolved = StaticEnvironment::new(id);
      if let Some(tasks) = &env.build {
        resolved = resolved.with_build(to_tasks(tasks)?);
      }
      if let Some(tasks) = &env.deploy {
        resolved = resolved.with_deploy(to_tasks(tasks)?);
      }
      if let Some(tasks) = &env.legacy {
        resolved = resolved.with_legacy(to_tasks(tasks)?);
      }
      environments.insert(id.clone(), Arc::new(resolved));
    }

    let mut slots = HashMap::new();
    for kind in [PipeKind::Build, PipeKind::Deploy] {
      let slot = TaskSlot::new();
      for extension in self.extensions.iter().filter(|e| e.joins(kind)) {
        slot.register(&extension.name, to_tasks(&extension.tasks)?);
      }
      slots.insert(kind, Arc::new(slot));
    }

    let capsules_dir = match &self.capsules_dir {
      Some(dir) => base_dir.join(dir),
      None => paths::capsules_dir(),
    };

    info!(
      components = components.len(),
      environments = environments.len(),
      extensions = self.extensions.len(),
      capsules_dir = ?capsules_dir,
      "resolved workspace"
    );

    Ok(ResolvedWorkspace {
      components,
      environments,
      slots,
      capsules_dir,
      reuse_capsules: self.reuse_capsules,
    })
  }
}

/// A validated workspace wired into runtime objects.
pub struct ResolvedWorkspace {
  /// Components in declaration order, each with its environment id.
  components: Vec<(String, Component)>,
  pub environments: BTreeMap<String, Arc<StaticEnvironment>>,
  slots: HashMap<PipeKind, Arc<TaskSlot>>,
  pub capsules_dir: PathBuf,
  pub reuse_capsules: bool,
}

impl ResolvedWorkspace {
  pub fn components(&self) -> impl Iterator<Item = &Component> {
    self.components.iter().map(|(_, c)| c)
  }

  pub fn components_for(&self, env: &str) -> Vec<Component> {
    self
      .components
      .iter()
      .filter(|(e, _)| e == env)
      .map(|(_, c)| c.clone())
      .collect()
  }

  /// Registry holding the extension tasks that join `kind`.
  pub fn slot(&self, kind: PipeKind) -> Arc<TaskSlot> {
    self.slots.get(&kind).cloned().unwrap_or_default()
  }

  /// One context per environment that has components, in environment order.
  pub fn execution_contexts(&self) -> Vec<ExecutionContext> {
    self
      .environments
      .iter()
      .filter_map(|(id, env)| {
        let components = self.components_for(id);
        if components.is_empty() {
          return None;
        }
        let env: Arc<dyn Environment> = env.clone();
        Some(ExecutionContext::new(env, components))
      })
      .collect()
  }
}
