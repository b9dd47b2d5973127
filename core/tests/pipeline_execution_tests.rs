// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use parcelpay_flow::{ContextData, FlowError, Pipeline, PipelineControl, PipelineResult, SkipCondition};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn steps_run_in_declaration_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[
    ("parse", false, None),
    ("resolve", false, None),
    ("apply", false, None),
  ]);
  pipeline.on("parse", recording_handler("parse"));
  pipeline.on("resolve", recording_handler("resolve"));
  pipeline.on("apply", recording_handler("apply"));

  let ctx = ContextData::new(TrailCtx::default());
  let result = pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(result, PipelineResult::Completed);
  assert_eq!(ctx.read().trail, vec!["parse", "resolve", "apply"]);
}

#[tokio::test]
#[serial]
async fn stop_reports_the_halting_step() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[
    ("parse", false, None),
    ("guard_duplicate", false, None),
    ("apply", false, None),
  ]);
  pipeline.on("parse", recording_handler("parse"));
  pipeline.on("guard_duplicate", recording_handler("guard_duplicate"));
  pipeline.on("apply", recording_handler("apply"));

  let ctx = ContextData::new(TrailCtx {
    halt_at: Some("guard_duplicate".to_string()),
    ..Default::default()
  });
  let result = pipeline.run(ctx.clone()).await.unwrap();

  assert_eq!(
    result,
    PipelineResult::Stopped {
      step: "guard_duplicate".to_string()
    }
  );
  assert_eq!(result.stopped_at(), Some("guard_duplicate"));
  assert_eq!(ctx.read().trail, vec!["parse", "guard_duplicate"]);
}

#[tokio::test]
#[serial]
async fn handler_error_propagates_and_halts() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[
    ("parse", false, None),
    ("call_gateway", false, None),
    ("apply", false, None),
  ]);
  pipeline.on("parse", recording_handler("parse"));
  pipeline.on("call_gateway", failing_handler("call_gateway"));
  pipeline.on("apply", recording_handler("apply"));

  let ctx = ContextData::new(TrailCtx::default());
  let err = pipeline.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Handler("call_gateway failed".to_string()));
  assert_eq!(ctx.read().trail, vec!["parse", "call_gateway"]);
}

#[tokio::test]
#[serial]
async fn skip_condition_bypasses_step() {
  setup_tracing();
  let nothing_to_capture: SkipCondition<TrailCtx> = Arc::new(|ctx: &ContextData<TrailCtx>| ctx.read().amount_cents == 0);
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[
    ("parse", false, None),
    ("capture", false, Some(nothing_to_capture)),
    ("audit", false, None),
  ]);
  pipeline.on("parse", recording_handler("parse"));
  pipeline.on("capture", recording_handler("capture"));
  pipeline.on("audit", recording_handler("audit"));

  let ctx = ContextData::new(TrailCtx::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().trail, vec!["parse", "audit"]);

  let paying = ContextData::new(TrailCtx {
    amount_cents: 61990,
    ..Default::default()
  });
  pipeline.run(paying.clone()).await.unwrap();
  assert_eq!(paying.read().trail, vec!["parse", "capture", "audit"]);
}

#[tokio::test]
#[serial]
async fn required_step_without_handlers_fails() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("parse", false, None), ("unwired", false, None)]);
  pipeline.on("parse", recording_handler("parse"));

  let err = pipeline.run(ContextData::new(TrailCtx::default())).await.unwrap_err();
  match err {
    TestError::Flow(msg) => {
      assert!(msg.contains("HandlerMissing"));
      assert!(msg.contains("unwired"));
    }
    other => panic!("expected flow error, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn optional_step_without_handlers_is_skipped() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("parse", false, None), ("notify", true, None)]);
  pipeline.on("parse", recording_handler("parse"));

  let result = pipeline.run(ContextData::new(TrailCtx::default())).await.unwrap();
  assert!(result.is_completed());
}

#[tokio::test]
#[serial]
async fn before_on_after_run_in_phase_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("apply", false, None)]);
  pipeline.after("apply", recording_handler("after"));
  pipeline.on("apply", recording_handler("on_1"));
  pipeline.before("apply", recording_handler("before"));
  pipeline.on("apply", recording_handler("on_2"));

  let ctx = ContextData::new(TrailCtx::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().trail, vec!["before", "on_1", "on_2", "after"]);
}

#[tokio::test]
#[serial]
async fn stop_in_before_phase_skips_on_and_after() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("apply", false, None)]);
  pipeline.before("apply", |ctx: ContextData<TrailCtx>| async move {
    ctx.write().trail.push("before".to_string());
    Ok::<_, FlowError>(PipelineControl::Stop)
  });
  pipeline.on("apply", recording_handler("on"));
  pipeline.after("apply", recording_handler("after"));

  let ctx = ContextData::new(TrailCtx::default());
  let result = pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(result.stopped_at(), Some("apply"));
  assert_eq!(ctx.read().trail, vec!["before"]);
}

#[tokio::test]
#[serial]
async fn steps_can_be_inserted_and_removed() {
  setup_tracing();
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("parse", false, None), ("apply", false, None)]);
  pipeline.insert_after_step("parse", "resolve", false, None).unwrap();
  assert_eq!(pipeline.step_names(), vec!["parse", "resolve", "apply"]);

  pipeline.on("parse", recording_handler("parse"));
  pipeline.on("resolve", recording_handler("resolve"));
  pipeline.on("apply", recording_handler("apply"));
  pipeline.remove_step("resolve").unwrap();

  let ctx = ContextData::new(TrailCtx::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().trail, vec!["parse", "apply"]);

  assert!(matches!(
    pipeline.remove_step("resolve"),
    Err(FlowError::StepNotFound { .. })
  ));
}

#[test]
#[should_panic(expected = "setup error")]
fn registering_on_unknown_step_panics() {
  let mut pipeline = Pipeline::<TrailCtx, TestError>::new(&[("parse", false, None)]);
  pipeline.on("prase", recording_handler("prase"));
}
