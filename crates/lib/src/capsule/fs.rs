//! Directory-backed capsule provider.
//!
//! Each component's source directory is copied into
//! `<root>/<capsule-dir-name>/`. Once the copy is complete a marker file is
//! written containing the hash of the capsule contents; a capsule without a
//! marker is treated as incomplete and recreated.
//!
//! # Layout
//!
//! ```text
//! capsules/
//! └── ui-button-1a2b3c4d5e6f/
//!     ├── .pipewright-capsule     # CapsuleMarker (JSON)
//!     └── ...                     # copy of the component sources
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Capsule, CapsuleError, CapsuleGraph, CapsuleProvider, NetworkOptions};
use crate::component::{Component, ComponentId};
use crate::consts::{CAPSULE_MARKER, CAPSULE_MARKER_VERSION};
use crate::util::hash::{hash_directory, short_hash};

/// Marker file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleMarker {
  /// Marker format version.
  pub version: u32,
  pub component: ComponentId,
  /// Full SHA256 of the capsule contents at materialization time.
  pub content_hash: String,
}

/// Directory name of a component's capsule: sanitized id plus a short id hash.
pub fn capsule_dir_name(id: &ComponentId) -> String {
  let sanitized: String = id
    .as_str()
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
    .collect();
  format!("{}-{}", sanitized.trim_matches('-'), short_hash(id.as_str()))
}

/// Read the capsule marker, `None` when the capsule is incomplete.
pub fn read_capsule_marker(capsule_path: &Path) -> Result<Option<CapsuleMarker>, CapsuleError> {
  let marker_path = capsule_path.join(CAPSULE_MARKER);
  if !marker_path.exists() {
    return Ok(None);
  }
  let content = std::fs::read_to_string(&marker_path).map_err(|source| CapsuleError::MarkerIo {
    path: marker_path.clone(),
    source,
  })?;
  serde_json::from_str(&content)
    .map(Some)
    .map_err(|e| CapsuleError::Marker {
      path: marker_path,
      message: e.to_string(),
    })
}

pub struct FsCapsuleProvider {
  root: PathBuf,
  components: HashMap<ComponentId, Component>,
  provisioned: AtomicUsize,
  locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl FsCapsuleProvider {
  pub fn new(root: impl Into<PathBuf>, components: impl IntoIterator<Item = Component>) -> Self {
    Self {
      root: root.into(),
      components: components.into_iter().map(|c| (c.id.clone(), c)).collect(),
      provisioned: AtomicUsize::new(0),
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn capsule_path(&self, id: &ComponentId) -> PathBuf {
    self.root.join(capsule_dir_name(id))
  }

  /// Number of capsules materialized (not reused) by this provider.
  pub fn provisioned_count(&self) -> usize {
    self.provisioned.load(Ordering::SeqCst)
  }

  fn path_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(path.to_path_buf()).or_default().clone()
  }

  /// Drop the map entry for `path` unless another caller still holds it.
  fn release_path_lock(&self, path: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
    let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // One reference lives in the map and one is `lock`; waiters hold more.
    let unshared = match locks.get(path) {
      Some(entry) => Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2,
      None => false,
    };
    if unshared {
      locks.remove(path);
    }
  }

  async fn provision(&self, component: &Component, options: &NetworkOptions) -> Result<Capsule, CapsuleError> {
    let path = self.capsule_path(&component.id);
    let lock = self.path_lock(&path);
    let result = {
      let _guard = lock.lock().await;
      self.provision_locked(component, path.clone(), options).await
    };
    self.release_path_lock(&path, lock);
    result
  }

  async fn provision_locked(
    &self,
    component: &Component,
    path: PathBuf,
    options: &NetworkOptions,
  ) -> Result<Capsule, CapsuleError> {
    if path.exists() {
      match read_capsule_marker(&path) {
        Ok(Some(_)) if options.reuse_existing => {
          debug!(component = %component.id, path = ?path, "reusing existing capsule");
          return Ok(Capsule {
            component: component.id.clone(),
            path,
            reused: true,
          });
        }
        Ok(Some(_)) => debug!(component = %component.id, "recreating capsule"),
        Ok(None) => debug!(component = %component.id, "incomplete capsule found, removing"),
        Err(e) => warn!(component = %component.id, error = %e, "invalid capsule marker, removing"),
      }
      fs::remove_dir_all(&path)
        .await
        .map_err(|source| CapsuleError::Materialize {
          component: component.id.clone(),
          source,
        })?;
    }

    info!(component = %component.id, path = ?path, "materializing capsule");

    let source_dir = component.root_dir.clone();
    let target = path.clone();
    let root = self.root.clone();
    let id = component.id.clone();
    let marker = tokio::task::spawn_blocking(move || materialize(&id, &source_dir, &target, &root))
      .await
      .map_err(|e| CapsuleError::Provider(e.to_string()))??;

    let content = serde_json::to_string(&marker).map_err(|e| CapsuleError::Marker {
      path: path.join(CAPSULE_MARKER),
      message: e.to_string(),
    })?;
    fs::write(path.join(CAPSULE_MARKER), format!("{}\n", content))
      .await
      .map_err(|source| CapsuleError::Materialize {
        component: component.id.clone(),
        source,
      })?;

    self.provisioned.fetch_add(1, Ordering::SeqCst);

    Ok(Capsule {
      component: component.id.clone(),
      path,
      reused: false,
    })
  }
}

/// Copy `source` into `target` and hash the result.
///
/// Anything under `capsules_root` is skipped so a component rooted at the
/// workspace directory does not copy the capsules into themselves.
fn materialize(
  id: &ComponentId,
  source: &Path,
  target: &Path,
  capsules_root: &Path,
) -> Result<CapsuleMarker, CapsuleError> {
  let io_err = |source: io::Error| CapsuleError::Materialize {
    component: id.clone(),
    source,
  };

  if !source.is_dir() {
    return Err(io_err(io::Error::new(
      io::ErrorKind::NotFound,
      format!("source directory {} does not exist", source.display()),
    )));
  }

  std::fs::create_dir_all(target).map_err(io_err)?;

  let walker = WalkDir::new(source)
    .into_iter()
    .filter_entry(|e| !e.path().starts_with(capsules_root));

  for entry in walker {
    let entry = entry.map_err(|e| io_err(io::Error::other(e.to_string())))?;
    let rel = match entry.path().strip_prefix(source) {
      Ok(rel) if !rel.as_os_str().is_empty() => rel,
      _ => continue,
    };
    let dest = target.join(rel);
    let file_type = entry.file_type();
    if file_type.is_dir() {
      std::fs::create_dir_all(&dest).map_err(io_err)?;
    } else if file_type.is_symlink() {
      // Links are recreated as-is, dangling or not; their targets are not copied.
      let link = std::fs::read_link(entry.path()).map_err(io_err)?;
      copy_symlink(&link, entry.path(), &dest).map_err(io_err)?;
    } else {
      std::fs::copy(entry.path(), &dest).map_err(io_err)?;
    }
  }

  let content_hash = hash_directory(target, &[CAPSULE_MARKER]).map_err(|source| CapsuleError::Hash {
    component: id.clone(),
    source,
  })?;

  Ok(CapsuleMarker {
    version: CAPSULE_MARKER_VERSION,
    component: id.clone(),
    content_hash: content_hash.0,
  })
}

#[cfg(unix)]
fn copy_symlink(link: &Path, _source: &Path, dest: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, dest)
}

#[cfg(windows)]
fn copy_symlink(link: &Path, source: &Path, dest: &Path) -> io::Result<()> {
  if source.is_dir() {
    std::os::windows::fs::symlink_dir(link, dest)
  } else {
    std::os::windows::fs::symlink_file(link, dest)
  }
}

#[async_trait]
impl CapsuleProvider for FsCapsuleProvider {
  async fn create_network(&self, ids: &[ComponentId], options: &NetworkOptions) -> Result<CapsuleGraph, CapsuleError> {
    info!(
      count = ids.len(),
      reuse_existing = options.reuse_existing,
      root = ?self.root,
      "creating capsule network"
    );

    let mut graph = CapsuleGraph::new();
    for id in ids {
      let component = self
        .components
        .get(id)
        .ok_or_else(|| CapsuleError::UnknownComponent(id.clone()))?;
      graph.add(self.provision(component, options).await?);
    }

    for id in ids {
      if let Some(component) = self.components.get(id) {
        for dependency in &component.dependencies {
          graph.link(dependency, id);
        }
      }
    }

    Ok(graph)
  }
}
