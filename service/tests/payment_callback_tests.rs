// tests/payment_callback_tests.rs

mod common;

use actix_web::http::header::{CONTENT_TYPE, LOCATION};
use actix_web::http::StatusCode;
use actix_web::test;
use common::*;
use parcelpay_service::models::{OrderStatus, PaymentStatus};

const CALLBACK: &str = "/api/v1/payments/callback";
const FORM: &str = "application/x-www-form-urlencoded";

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
  resp
    .headers()
    .get(LOCATION)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_string()
}

#[actix_web::test]
async fn successful_callback_marks_paid_and_decrements_stock_once() {
  let app = TestApp::new();
  let (order, tracked, untracked) = app.pending_order().await;
  let service = test_service!(app);
  let body = format!("Siparis_ID={}&Sonuc=1&Sonuc_Str=Onaylandi&Islem_ID=TX-77", order.order_number);

  let req = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload(body.clone())
    .to_request();
  let resp = test::call_service(&service, req).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), format!("/checkout/success?order={}", order.order_number));

  let paid = app.reload(&order).await;
  assert_eq!(paid.order_status, OrderStatus::Processing);
  assert_eq!(paid.payment_status, PaymentStatus::Paid);
  assert_eq!(paid.payment_transaction_id.as_deref(), Some("TX-77"));
  assert_eq!(app.orders.inventory(tracked).unwrap().stock, 8);
  assert_eq!(app.orders.inventory(untracked).unwrap().stock, 0);
  assert_eq!(app.carts.clear_calls(), vec![order.user_id.unwrap()]);

  // The provider retries the same callback.
  let replay = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload(body)
    .to_request();
  let resp = test::call_service(&service, replay).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), format!("/checkout/success?order={}", order.order_number));
  assert_eq!(app.orders.inventory(tracked).unwrap().stock, 8);
  assert_eq!(app.carts.clear_calls().len(), 1);
  assert!(app.wait_for_activity("payment_callback").await);
}

#[actix_web::test]
async fn failed_callback_cancels_without_touching_stock() {
  let app = TestApp::new();
  let (order, tracked, _) = app.pending_order().await;
  let service = test_service!(app);

  let req = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload(format!("Siparis_ID={}&Sonuc=-1&Sonuc_Str=Yetersiz+bakiye", order.order_number))
    .to_request();
  let resp = test::call_service(&service, req).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  let target = location(&resp);
  assert!(target.starts_with("/checkout/failed?"), "unexpected redirect {}", target);
  assert!(target.contains(&format!("order={}", order.order_number)));
  assert!(target.contains("message=Yetersiz+bakiye"));

  let failed = app.reload(&order).await;
  assert_eq!(failed.order_status, OrderStatus::Cancelled);
  assert_eq!(failed.payment_status, PaymentStatus::Failed);
  assert!(failed.payment_payload.is_some());
  assert_eq!(app.orders.inventory(tracked).unwrap().stock, 10);
  assert!(app.carts.clear_calls().is_empty());
}

#[actix_web::test]
async fn success_after_failure_is_refused() {
  let app = TestApp::new();
  let (order, tracked, _) = app.pending_order().await;
  let service = test_service!(app);

  for code in ["-1", "1"] {
    let req = test::TestRequest::post()
      .uri(CALLBACK)
      .insert_header((CONTENT_TYPE, FORM))
      .set_payload(format!("Siparis_ID={}&Sonuc={}", order.order_number, code))
      .to_request();
    let resp = test::call_service(&service, req).await;
    assert!(location(&resp).starts_with("/checkout/failed"));
  }

  let order = app.reload(&order).await;
  assert_eq!(order.order_status, OrderStatus::Cancelled);
  assert_eq!(order.payment_status, PaymentStatus::Failed);
  assert_eq!(app.orders.inventory(tracked).unwrap().stock, 10);
}

#[actix_web::test]
async fn get_callback_with_modal_field_names() {
  let app = TestApp::new();
  let (order, _, _) = app.pending_order().await;
  let service = test_service!(app);

  let uri = format!(
    "{}?orderId={}&resultCode=success&transactionId=HX-1",
    CALLBACK, order.order_number
  );
  let resp = test::call_service(&service, test::TestRequest::get().uri(&uri).to_request()).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert!(location(&resp).starts_with("/checkout/success"));

  let paid = app.reload(&order).await;
  assert_eq!(paid.payment_status, PaymentStatus::Paid);
  assert_eq!(paid.payment_transaction_id.as_deref(), Some("HX-1"));
}

#[actix_web::test]
async fn json_callback_referencing_order_id() {
  let app = TestApp::new();
  let (order, _, _) = app.pending_order().await;
  let service = test_service!(app);

  let req = test::TestRequest::post()
    .uri(CALLBACK)
    .set_json(serde_json::json!({ "order_id": order.id.to_string(), "status": 1 }))
    .to_request();
  let resp = test::call_service(&service, req).await;
  assert!(location(&resp).starts_with("/checkout/success"));
  assert_eq!(app.reload(&order).await.payment_status, PaymentStatus::Paid);
}

#[actix_web::test]
async fn stock_failure_keeps_payment_and_warns() {
  let app = TestApp::new();
  let (order, tracked, _) = app.pending_order().await;
  app.orders.fail_stock_updates(true);
  let service = test_service!(app);

  let req = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload(format!("Siparis_ID={}&Sonuc=1", order.order_number))
    .to_request();
  let resp = test::call_service(&service, req).await;
  assert!(location(&resp).starts_with("/checkout/success"));

  let paid = app.reload(&order).await;
  assert_eq!(paid.order_status, OrderStatus::Processing);
  assert_eq!(paid.payment_status, PaymentStatus::Paid);
  assert_eq!(app.orders.inventory(tracked).unwrap().stock, 10);
  assert!(app.wait_for_activity("stock_reconciliation_warning").await);
}

#[actix_web::test]
async fn unusable_callbacks_redirect_to_failure() {
  let app = TestApp::new();
  let (order, _, _) = app.pending_order().await;
  let service = test_service!(app);

  let missing_ref = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload("Sonuc=1")
    .to_request();
  let resp = test::call_service(&service, missing_ref).await;
  assert_eq!(location(&resp), "/checkout/failed?message=Invalid+payment+response");

  let unknown = test::TestRequest::post()
    .uri(CALLBACK)
    .insert_header((CONTENT_TYPE, FORM))
    .set_payload("Siparis_ID=ORD-DOES-NOT-EXIST&Sonuc=1")
    .to_request();
  let resp = test::call_service(&service, unknown).await;
  assert_eq!(
    location(&resp),
    "/checkout/failed?order=ORD-DOES-NOT-EXIST&message=Order+not+found"
  );

  let untouched = app.reload(&order).await;
  assert_eq!(untouched.order_status, OrderStatus::Pending);
  assert_eq!(untouched.payment_status, PaymentStatus::Pending);
  assert!(app.wait_for_activity("payment_callback").await);
}
