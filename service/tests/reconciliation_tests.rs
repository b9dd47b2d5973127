// tests/reconciliation_tests.rs

mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use common::*;
use parcelpay_service::activity::{ActivityLog, ActivityLogWorker};
use parcelpay_service::gateways::shipping::CarrierStatus;
use parcelpay_service::models::OrderStatus;
use parcelpay_service::reconciliation::{ReconcileError, Reconciler};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn hung_carrier_call_does_not_stop_the_pass() {
  let app = TestApp::new();
  let first = app.shipped_order("shp_a").await;
  let middle = app.shipped_order("shp_b").await;
  let last = app.shipped_order("shp_c").await;
  app.shipping.set_tracking("shp_a", TrackingBehavior::Status(CarrierStatus::InTransit));
  app.shipping.set_tracking("shp_b", TrackingBehavior::Hang);
  app.shipping.set_tracking("shp_c", TrackingBehavior::Status(CarrierStatus::Delivered));

  let (log, rx) = ActivityLog::channel(16);
  tokio::spawn(ActivityLogWorker::new(Arc::new(app.activity.clone())).run(rx));
  let reconciler = Reconciler::new(
    app.orders.clone(),
    app.shipping.clone(),
    log,
    Duration::ZERO,
    Duration::from_millis(100),
  );

  let report = reconciler.run_pass().await.unwrap();
  assert_eq!(report.checked, 3);
  assert_eq!(report.updated, 2);
  assert_eq!(report.errors, 1);
  assert_eq!(report.updates.len(), 2);

  assert_eq!(app.reload(&first).await.order_status, OrderStatus::Shipped);
  assert_eq!(app.reload(&middle).await.order_status, OrderStatus::Processing);
  assert_eq!(app.reload(&last).await.order_status, OrderStatus::Delivered);
  assert!(app.wait_for_activity("shipping_reconciliation").await);
}

#[tokio::test(start_paused = true)]
async fn tracking_calls_are_spaced_by_the_call_delay() {
  let app = TestApp::new();
  for shipment_id in ["shp_r1", "shp_r2", "shp_r3"] {
    app.shipped_order(shipment_id).await;
    app.shipping.set_tracking(shipment_id, TrackingBehavior::Status(CarrierStatus::InTransit));
  }

  let delay = Duration::from_millis(250);
  let (log, _rx) = ActivityLog::channel(16);
  let reconciler = Reconciler::new(app.orders.clone(), app.shipping.clone(), log, delay, Duration::from_secs(1));

  let started = tokio::time::Instant::now();
  let report = reconciler.run_pass().await.unwrap();
  assert_eq!(report.checked, 3);

  let calls: Vec<_> = app.shipping.tracking_calls.lock().iter().map(|(_, at)| *at).collect();
  assert_eq!(calls.len(), 3);
  // The first lookup is not delayed.
  assert!(calls[0] - started < delay);
  assert!(calls[1] - calls[0] >= delay);
  assert!(calls[2] - calls[1] >= delay);
  assert!(tokio::time::Instant::now() - started >= delay * 2);
}

#[tokio::test]
async fn gateway_errors_are_counted_per_order() {
  let app = TestApp::new();
  app.shipped_order("shp_down").await;
  let ok = app.shipped_order("shp_up").await;
  app.shipping.set_tracking("shp_down", TrackingBehavior::Fail);
  app.shipping.set_tracking("shp_up", TrackingBehavior::Status(CarrierStatus::Returned));

  let report = app.state.reconciler.run_pass().await.unwrap();
  assert_eq!((report.checked, report.updated, report.errors), (2, 1, 1));

  let returned = app.reload(&ok).await;
  assert_eq!(returned.order_status, OrderStatus::Cancelled);
  assert_eq!(returned.shipment.tracking_status.as_deref(), Some("RETURNED"));
}

#[tokio::test]
async fn second_pass_with_same_status_changes_nothing() {
  let app = TestApp::new();
  app.shipped_order("shp_same").await;
  app.shipping.set_tracking("shp_same", TrackingBehavior::Status(CarrierStatus::InTransit));

  let first = app.state.reconciler.run_pass().await.unwrap();
  assert_eq!(first.updated, 1);
  let second = app.state.reconciler.run_pass().await.unwrap();
  assert_eq!((second.checked, second.updated, second.errors), (1, 0, 0));
}

#[tokio::test]
async fn overlapping_pass_is_refused() {
  let app = TestApp::new();
  app.shipped_order("shp_slow").await;
  app.shipping.set_tracking("shp_slow", TrackingBehavior::Hang);

  let reconciler = app.state.reconciler.clone();
  let running = tokio::spawn(async move { reconciler.run_pass().await });
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(app.state.reconciler.is_running());

  let overlap = app.state.reconciler.run_pass().await;
  assert!(matches!(overlap, Err(ReconcileError::AlreadyRunning)));

  let report = running.await.unwrap().unwrap();
  assert_eq!(report.errors, 1);
  assert!(!app.state.reconciler.is_running());
}

#[actix_web::test]
async fn trigger_endpoint_reports_stats() {
  let app = TestApp::with(
    config_with(&[("RECONCILE_TRIGGER_TOKEN", "s3cret")]),
    PaymentBehavior::Approve,
    FakeShipping::new(),
  );
  let order = app.shipped_order("shp_http").await;
  app.shipping.set_tracking("shp_http", TrackingBehavior::Status(CarrierStatus::PickedUp));
  let service = test_service!(app);

  let resp = test::call_service(
    &service,
    test::TestRequest::get().uri("/api/v1/shipping/reconcile").to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let resp = test::call_service(
    &service,
    test::TestRequest::get()
      .uri("/api/v1/shipping/reconcile?token=wrong")
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let req = test::TestRequest::get()
    .uri("/api/v1/shipping/reconcile?token=s3cret")
    .to_request();
  let body: Value = test::call_and_read_body_json(&service, req).await;
  assert_eq!(body["success"], true);
  assert_eq!(body["stats"]["checked"], 1);
  assert_eq!(body["stats"]["updated"], 1);
  assert_eq!(body["stats"]["errors"], 0);
  assert_eq!(body["updates"][0]["orderNumber"], order.order_number.as_str());
  assert_eq!(body["updates"][0]["newStatus"], "SHIPPED");
}

#[actix_web::test]
async fn trigger_during_a_pass_is_a_conflict() {
  let app = TestApp::new();
  app.shipped_order("shp_busy").await;
  app.shipping.set_tracking("shp_busy", TrackingBehavior::Hang);
  let service = test_service!(app);

  let reconciler = app.state.reconciler.clone();
  let running = tokio::spawn(async move { reconciler.run_pass().await });
  tokio::time::sleep(Duration::from_millis(50)).await;

  let resp = test::call_service(
    &service,
    test::TestRequest::get().uri("/api/v1/shipping/reconcile").to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  running.await.unwrap().unwrap();
}
