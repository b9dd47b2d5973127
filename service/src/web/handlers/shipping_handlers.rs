// service/src/web/handlers/shipping_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::gateways::shipping::{ReturnRequest, SenderProfile};
use crate::models::{Order, OrderKey};
use crate::state::AppState;

fn shipment_body(order: &Order) -> serde_json::Value {
  json!({
    "success": true,
    "orderNumber": order.order_number,
    "orderStatus": order.order_status,
    "shipment": order.shipment,
  })
}

#[instrument(name = "handler::create_shipment", skip(app_state))]
pub async fn create_shipment_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .shipments
    .create_for_order(&OrderKey::parse(&order_number))
    .await?;
  Ok(HttpResponse::Ok().json(shipment_body(&order)))
}

#[instrument(name = "handler::cancel_shipment", skip(app_state))]
pub async fn cancel_shipment_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.shipments.cancel(&OrderKey::parse(&order_number)).await?;
  Ok(HttpResponse::Ok().json(shipment_body(&order)))
}

#[instrument(name = "handler::create_return", skip(app_state, body))]
pub async fn create_return_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
  body: Option<web::Json<ReturnRequest>>,
) -> Result<HttpResponse, AppError> {
  let request = body.map(web::Json::into_inner).unwrap_or_default();
  let return_id = app_state
    .shipments
    .create_return(&OrderKey::parse(&order_number), &request)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "returnId": return_id })))
}

#[instrument(name = "handler::register_sender", skip(app_state, body))]
pub async fn register_sender_handler(
  app_state: web::Data<AppState>,
  body: web::Json<SenderProfile>,
) -> Result<HttpResponse, AppError> {
  let sender_id = app_state.shipments.register_sender(&body).await?;
  Ok(HttpResponse::Created().json(json!({ "success": true, "senderId": sender_id })))
}
