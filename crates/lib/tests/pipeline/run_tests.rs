use std::sync::Arc;

use pipewright_lib::component::ComponentId;
use pipewright_lib::pipeline::{PipeKind, RunError, StaticEnvironment};
use pipewright_lib::service::{BuilderService, RunState};
use pipewright_lib::task::TaskSlot;

use super::common::{Banners, Behavior, CountingProvider, Recording, entries, exec, log};

fn service(slot: TaskSlot, banners: &Arc<Banners>) -> BuilderService {
  BuilderService::new(Arc::new(slot), Arc::new(CountingProvider::default()), PipeKind::Build)
    .with_reporter(banners.clone())
}

#[tokio::test]
async fn component_failure_does_not_stop_pipeline() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("compile", &log)
      .behave(Behavior::FailFor(vec!["comp1".into()]))
      .into_task(),
    Recording::new("test", &log).into_task(),
  ]);
  let banners = Arc::new(Banners::default());

  let results = service(TaskSlot::new(), &banners)
    .run(exec(env, &["comp1", "comp2"]))
    .await
    .unwrap();

  assert_eq!(entries(&log), vec!["compile", "test"]);
  assert_eq!(results.state, RunState::Completed);
  assert!(results.errors.is_empty());

  let compile = results.build_results.task("compile").unwrap();
  assert_eq!(compile.component(&"comp1".into()).unwrap().errors, vec!["compile failed"]);
  assert!(compile.component(&"comp2".into()).unwrap().is_success());
  assert_eq!(results.build_results.failed_components(), vec![ComponentId::from("comp1")]);

  let test = results.build_results.task("test").unwrap();
  assert_eq!(test.components.len(), 2);
  assert!(test.component(&"comp1".into()).unwrap().is_success());
  assert!(test.component(&"comp2".into()).unwrap().is_success());

  assert!(!results.is_success());
  assert_eq!(banners.events(), vec!["start", "end", "failure"]);
}

#[tokio::test]
async fn fatal_task_aborts_after_recording_its_result() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("compile", &log).into_task(),
    Recording::new("publish", &log).behave(Behavior::Fatal).into_task(),
    Recording::new("notify", &log).into_task(),
  ]);
  let banners = Arc::new(Banners::default());

  let results = service(TaskSlot::new(), &banners)
    .run(exec(env, &["comp1"]))
    .await
    .unwrap();

  assert_eq!(entries(&log), vec!["compile", "publish"]);
  assert_eq!(results.build_results.len(), 2);
  assert_eq!(results.state, RunState::Aborted);
  assert_eq!(
    results.errors,
    vec![RunError::Aborted {
      task: "publish".to_string(),
      index: 1,
      total: 3,
    }]
  );
  assert!(results.build_results.task("publish").unwrap().pipeline_fatal);
  assert_eq!(banners.events(), vec!["start", "end", "failure"]);
}

#[tokio::test]
async fn context_violation_aborts_the_run() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("prune", &log).behave(Behavior::DropComponent).into_task(),
    Recording::new("compile", &log).into_task(),
  ]);
  let banners = Arc::new(Banners::default());

  let results = service(TaskSlot::new(), &banners)
    .run(exec(env, &["comp1", "comp2"]))
    .await
    .unwrap();

  assert_eq!(entries(&log), vec!["prune"]);
  assert_eq!(results.build_results.len(), 1);
  assert_eq!(results.state, RunState::Aborted);
  assert!(matches!(
    results.errors.as_slice(),
    [RunError::ContextViolation { task, .. }] if task == "prune"
  ));
  assert!(!results.is_success());
  assert_eq!(banners.events(), vec!["start", "end", "failure"]);
}

#[tokio::test]
async fn fatal_first_task_yields_one_result() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("gate", &log).behave(Behavior::Fatal).into_task(),
    Recording::new("compile", &log).into_task(),
  ]);

  let results = service(TaskSlot::new(), &Arc::new(Banners::default()))
    .run(exec(env, &["comp1"]))
    .await
    .unwrap();

  assert_eq!(results.build_results.len(), 1);
  assert_eq!(entries(&log), vec!["gate"]);
}

#[tokio::test]
async fn artifact_collision_keeps_first_and_flags_component() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("compile", &log)
      .behave(Behavior::DuplicateArtifact("dist".to_string()))
      .into_task(),
  ]);

  let results = service(TaskSlot::new(), &Arc::new(Banners::default()))
    .run(exec(env, &["comp1"]))
    .await
    .unwrap();

  let comp1 = results
    .build_results
    .task("compile")
    .unwrap()
    .component(&"comp1".into())
    .unwrap();
  assert_eq!(comp1.artifacts.len(), 1);
  assert_eq!(comp1.artifacts[0].outputs, vec![std::path::PathBuf::from("first")]);
  assert_eq!(comp1.errors.len(), 1);
  assert!(comp1.errors[0].contains("dist"));
}

#[tokio::test]
async fn same_artifact_name_in_different_tasks_is_allowed() {
  let log = log();
  let env = StaticEnvironment::new("node").with_build(vec![
    Recording::new("compile", &log)
      .behave(Behavior::Artifact("dist".to_string()))
      .into_task(),
    Recording::new("bundle", &log)
      .behave(Behavior::Artifact("dist".to_string()))
      .into_task(),
  ]);

  let results = service(TaskSlot::new(), &Arc::new(Banners::default()))
    .run(exec(env, &["comp1"]))
    .await
    .unwrap();

  assert!(results.is_success());
  let artifacts = results.build_results.artifacts_for(&"comp1".into());
  let tasks: Vec<&str> = artifacts.iter().map(|a| a.task.as_str()).collect();
  assert_eq!(tasks, vec!["compile", "bundle"]);
}

#[tokio::test]
async fn empty_component_set_runs_every_task_once() {
  let log = log();
  let slot = TaskSlot::new();
  slot.register("ext", vec![Recording::new("lint", &log).into_task()]);
  let env = StaticEnvironment::new("node").with_build(vec![Recording::new("compile", &log).into_task()]);
  let banners = Arc::new(Banners::default());

  let results = service(slot, &banners).run(exec(env, &[])).await.unwrap();

  assert_eq!(entries(&log), vec!["lint", "compile"]);
  assert_eq!(results.build_results.len(), 2);
  assert!(results.build_results.tasks().iter().all(|t| t.components.is_empty()));
  assert!(results.components.is_empty());
  assert!(results.is_success());
  assert_eq!(banners.events(), vec!["start", "end", "success"]);
}

#[tokio::test]
async fn concurrent_runs_share_one_service() {
  let log = log();
  let env = || StaticEnvironment::new("node").with_build(vec![Recording::new("compile", &log).into_task()]);
  let service = service(TaskSlot::new(), &Arc::new(Banners::default()));

  let (a, b) = tokio::join!(service.run(exec(env(), &["comp1"])), service.run(exec(env(), &["comp2"])));

  let (a, b) = (a.unwrap(), b.unwrap());
  assert_ne!(a.run_id, b.run_id);
  assert_eq!(entries(&log).len(), 2);
}
