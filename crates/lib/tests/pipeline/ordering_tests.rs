use std::sync::Arc;

use pipewright_lib::pipeline::{BuildError, PipeKind, StaticEnvironment};
use pipewright_lib::service::BuilderService;
use pipewright_lib::task::{TaskLocation, TaskSlot};

use super::common::{Banners, CountingProvider, Recording, entries, exec, log};

#[tokio::test]
async fn registered_tasks_surround_environment_tasks() {
  let log = log();
  let slot = Arc::new(TaskSlot::new());
  slot.register("ext-a", vec![Recording::new("A", &log).at(TaskLocation::Start).into_task()]);
  slot.register("ext-b", vec![Recording::new("B", &log).into_task()]);
  slot.register("ext-c", vec![Recording::new("C", &log).at(TaskLocation::End).into_task()]);
  let env = StaticEnvironment::new("node").with_build(vec![Recording::new("D", &log).into_task()]);

  let service = BuilderService::new(slot, Arc::new(CountingProvider::default()), PipeKind::Build);
  let results = service.run(exec(env, &["comp1"])).await.unwrap();

  assert_eq!(entries(&log), vec!["A", "B", "D", "C"]);
  let names: Vec<&str> = results.build_results.tasks().iter().map(|t| t.task.as_str()).collect();
  assert_eq!(names, vec!["A", "B", "D", "C"]);
}

#[tokio::test]
async fn deploy_pipe_uses_deploy_tasks() {
  let log = log();
  let slot = Arc::new(TaskSlot::new());
  slot.register("ext", vec![Recording::new("lint", &log).into_task()]);
  let env = StaticEnvironment::new("node")
    .with_build(vec![Recording::new("compile", &log).into_task()])
    .with_deploy(vec![Recording::new("publish", &log).into_task()]);

  let service = BuilderService::new(slot, Arc::new(CountingProvider::default()), PipeKind::Deploy);
  service.run(exec(env, &["comp1"])).await.unwrap();

  assert_eq!(entries(&log), vec!["lint", "publish"]);
}

#[tokio::test]
async fn legacy_capability_rejects_run_before_provisioning() {
  let log = log();
  let slot = Arc::new(TaskSlot::new());
  slot.register("ext", vec![Recording::new("lint", &log).into_task()]);
  let env = StaticEnvironment::new("old")
    .with_build(vec![Recording::new("compile", &log).into_task()])
    .with_legacy(vec![Recording::new("everything", &log).into_task()]);
  let provider = Arc::new(CountingProvider::default());
  let banners = Arc::new(Banners::default());

  let service = BuilderService::new(slot, provider.clone(), PipeKind::Build).with_reporter(banners.clone());
  let err = service.run(exec(env, &["comp1", "comp2"])).await.unwrap_err();

  assert!(matches!(err, BuildError::Configuration(_)));
  assert_eq!(provider.calls(), 0);
  assert!(entries(&log).is_empty());
  assert_eq!(banners.events(), vec!["start", "end", "failure"]);
}
