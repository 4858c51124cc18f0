use std::path::Path;
use std::sync::Arc;

use pipewright_lib::capsule::{FsCapsuleProvider, NetworkOptions};
use pipewright_lib::component::Component;
use pipewright_lib::context::ExecutionContext;
use pipewright_lib::pipeline::{PipeKind, StaticEnvironment};
use pipewright_lib::service::BuilderService;
use pipewright_lib::task::TaskSlot;
use tempfile::TempDir;

use super::common::{Behavior, Recording, log};

fn workspace(root: &Path) -> Vec<Component> {
  ["theme", "button"]
    .iter()
    .map(|name| {
      let dir = root.join("components").join(name);
      std::fs::create_dir_all(&dir).unwrap();
      std::fs::write(dir.join("index.ts"), format!("export default '{}';", name)).unwrap();
      Component::new(format!("ui/{}", name), dir)
    })
    .collect()
}

fn exec(components: Vec<Component>) -> ExecutionContext {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("compile", &log)
      .behave(Behavior::Artifact("dist".to_string()))
      .into_task(),
  ]);
  ExecutionContext::new(Arc::new(env), components)
}

#[tokio::test]
async fn reuse_existing_skips_reprovisioning() {
  let temp = TempDir::new().unwrap();
  let components = workspace(temp.path());
  let provider = Arc::new(FsCapsuleProvider::new(temp.path().join("capsules"), components.clone()));
  let service = BuilderService::new(Arc::new(TaskSlot::new()), provider.clone(), PipeKind::Build)
    .with_network_options(NetworkOptions::reuse_existing());

  service.run(exec(components.clone())).await.unwrap();
  assert_eq!(provider.provisioned_count(), 2);

  let second = service.run(exec(components)).await.unwrap();
  assert_eq!(provider.provisioned_count(), 2);
  assert!(second.is_success());
}

#[tokio::test]
async fn without_reuse_every_run_provisions() {
  let temp = TempDir::new().unwrap();
  let components = workspace(temp.path());
  let provider = Arc::new(FsCapsuleProvider::new(temp.path().join("capsules"), components.clone()));
  let service = BuilderService::new(Arc::new(TaskSlot::new()), provider.clone(), PipeKind::Build)
    .with_network_options(NetworkOptions::default());

  service.run(exec(components.clone())).await.unwrap();
  service.run(exec(components)).await.unwrap();

  assert_eq!(provider.provisioned_count(), 4);
}

#[tokio::test]
async fn concurrent_runs_over_same_components_provision_once() {
  let temp = TempDir::new().unwrap();
  let components = workspace(temp.path());
  let provider = Arc::new(FsCapsuleProvider::new(temp.path().join("capsules"), components.clone()));
  let service = BuilderService::new(Arc::new(TaskSlot::new()), provider.clone(), PipeKind::Build);

  let (a, b) = tokio::join!(service.run(exec(components.clone())), service.run(exec(components)));

  assert!(a.unwrap().is_success());
  assert!(b.unwrap().is_success());
  assert_eq!(provider.provisioned_count(), 2);
}

#[tokio::test]
async fn unknown_component_is_a_provisioning_error() {
  let temp = TempDir::new().unwrap();
  let provider = Arc::new(FsCapsuleProvider::new(temp.path().join("capsules"), Vec::new()));
  let service = BuilderService::new(Arc::new(TaskSlot::new()), provider, PipeKind::Build);

  let err = service
    .run(exec(vec![Component::new("ghost", temp.path().join("ghost"))]))
    .await
    .unwrap_err();

  assert!(err.is_provisioning());
}

#[tokio::test]
async fn artifacts_point_into_capsules() {
  let temp = TempDir::new().unwrap();
  let components = workspace(temp.path());
  let provider = Arc::new(FsCapsuleProvider::new(temp.path().join("capsules"), components.clone()));
  let service = BuilderService::new(Arc::new(TaskSlot::new()), provider.clone(), PipeKind::Build);

  let results = service.run(exec(components)).await.unwrap();

  let artifacts = results.build_results.artifacts_for(&"ui/button".into());
  assert_eq!(artifacts.len(), 1);
  assert!(artifacts[0].outputs[0].starts_with(provider.capsule_path(&"ui/button".into())));
}
