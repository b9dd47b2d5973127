// service/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::errors::AppError;
use crate::models::{DeliveryOutcome, NewWebhookDelivery};
use crate::pipelines::contexts::ShippingWebhookCtx;
use crate::state::AppState;
use parcelpay_flow::ContextData;

pub const SHIPPING_SOURCE: &str = "shipping";

/// Largest slice of an unparsable body kept in the delivery log.
const RAW_EXCERPT_BYTES: usize = 2048;

fn outcome_for_error(err: &AppError) -> DeliveryOutcome {
  match err {
    AppError::SignatureInvalid(_) => DeliveryOutcome::Rejected,
    AppError::MalformedPayload(_) => DeliveryOutcome::Malformed,
    _ => DeliveryOutcome::Failed,
  }
}

#[instrument(name = "handler::shipping_webhook", skip(app_state, req, body), fields(body_len = body.len()))]
pub async fn shipping_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let header_name = app_state.config.webhook.signature_header.as_str();
  let signature = req
    .headers()
    .get(header_name)
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let ctx = ContextData::new(ShippingWebhookCtx::new(app_state.get_ref().clone(), body.clone(), signature));
  let result = app_state.flows.run(ctx.clone()).await;

  let (event, payload, ctx_outcome, ctx_message) =
    ctx.with(|c| (c.event.clone(), c.payload.clone(), c.outcome, c.message.clone()));
  let (outcome, message) = match &result {
    Ok(_) => (ctx_outcome, ctx_message),
    Err(e) => (outcome_for_error(e), e.to_string()),
  };
  let payload = payload.or_else(|| {
    // Rejected bodies are not kept.
    (outcome == DeliveryOutcome::Malformed).then(|| {
      let excerpt = &body[..body.len().min(RAW_EXCERPT_BYTES)];
      json!({ "raw": String::from_utf8_lossy(excerpt) })
    })
  });

  let delivery = NewWebhookDelivery {
    source: SHIPPING_SOURCE.to_string(),
    event_type: event.as_ref().map(|e| e.event_type.clone()),
    shipment_id: event.as_ref().and_then(|e| e.shipment_id.clone()),
    order_number: event.as_ref().and_then(|e| e.order_number.clone()),
    outcome,
    message: message.clone(),
    payload,
  };
  if let Err(e) = app_state.orders.record_webhook_delivery(delivery).await {
    error!(error = %e, "Failed to record webhook delivery.");
  }

  match result {
    Ok(run) => {
      info!(outcome = ?outcome, stopped_at = ?run.stopped_at(), %message, "Shipping webhook handled.");
      Ok(HttpResponse::Ok().json(json!({ "success": true, "message": message })))
    }
    Err(e) => {
      warn!(outcome = ?outcome, error = %e, "Shipping webhook not accepted.");
      Err(e)
    }
  }
}

#[derive(Debug, serde::Deserialize)]
pub struct DeliveryListQuery {
  pub limit: Option<usize>,
}

#[instrument(name = "handler::list_webhook_deliveries", skip(app_state))]
pub async fn list_webhook_deliveries_handler(
  app_state: web::Data<AppState>,
  query: web::Query<DeliveryListQuery>,
) -> Result<HttpResponse, AppError> {
  let limit = query.limit.unwrap_or(50).clamp(1, 500);
  let deliveries = app_state.orders.webhook_deliveries(limit).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "deliveries": deliveries })))
}
