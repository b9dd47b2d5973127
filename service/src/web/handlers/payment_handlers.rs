// service/src/web/handlers/payment_handlers.rs

use actix_web::http::header::LOCATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::activity::ActivityRecord;
use crate::errors::AppError;
use crate::gateways::payment::CardData;
use crate::models::PaymentMode;
use crate::pipelines::contexts::{CallbackOutcome, CheckoutCtx, PaymentCallbackCtx};
use crate::state::AppState;
use crate::web::payload::callback_fields;
use parcelpay_flow::ContextData;

fn default_installments() -> u32 {
  1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
  pub mode: PaymentMode,
  #[serde(default = "default_installments")]
  pub installments: u32,
  pub card: Option<CardData>,
  #[serde(alias = "customer_phone")]
  pub customer_phone: Option<String>,
}

#[instrument(
  name = "handler::initiate_payment",
  skip(app_state, body),
  fields(order_number = %order_number, mode = body.mode.as_str())
)]
pub async fn initiate_payment_handler(
  app_state: web::Data<AppState>,
  order_number: web::Path<String>,
  body: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
  let request = body.into_inner();
  let ctx = ContextData::new(CheckoutCtx::new(
    app_state.get_ref().clone(),
    order_number.into_inner(),
    request.mode,
    request.installments,
    request.card,
    request.customer_phone,
  ));

  app_state.flows.run(ctx.clone()).await?;

  let final_ctx = ctx.read();
  if let Some(redirect_url) = &final_ctx.redirect_url {
    return Ok(HttpResponse::Ok().json(json!({
      "success": true,
      "mode": final_ctx.mode,
      "redirectUrl": redirect_url,
    })));
  }
  let order = final_ctx
    .order
    .as_ref()
    .ok_or_else(|| AppError::Internal("checkout finished without an order".to_string()))?;
  info!(order_number = %order.order_number, "Direct payment captured.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "mode": final_ctx.mode,
    "orderNumber": order.order_number,
    "orderStatus": order.order_status,
    "paymentStatus": order.payment_status,
    "transactionId": final_ctx.transaction_id,
    "stock": final_ctx.stock,
  })))
}

/// Provider callback, POST or GET. Always answers with a redirect.
#[instrument(name = "handler::payment_callback", skip(app_state, req, body), fields(method = %req.method()))]
pub async fn payment_callback_handler(app_state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
  let state = app_state.get_ref();
  let fields = match callback_fields(&req, body).await {
    Ok(fields) => fields,
    Err(e) => {
      warn!(error = %e, "Unreadable payment callback.");
      audit(state, "unknown", "rejected", json!({ "error": e.to_string() }));
      return redirect(failure_location(state, None, &public_message(&e)));
    }
  };
  process_callback(state, fields).await
}

async fn process_callback(state: &AppState, fields: Vec<(String, String)>) -> HttpResponse {
  let ctx = ContextData::new(PaymentCallbackCtx::new(state.clone(), fields));
  let result = state.flows.run(ctx.clone()).await;

  let (payload, order, outcome, stock) = ctx.with(|c| (c.payload.clone(), c.order.clone(), c.outcome.clone(), c.stock.clone()));
  let order_ref = order
    .as_ref()
    .map(|o| o.order_number.clone())
    .or_else(|| payload.as_ref().map(|p| p.order_ref.clone()));
  let reference = order_ref.clone().unwrap_or_else(|| "unknown".to_string());
  let mut metadata = json!({
    "orderRef": order_ref,
    "resultCode": payload.as_ref().map(|p| p.result_code.clone()),
    "message": payload.as_ref().and_then(|p| p.message.clone()),
    "transactionId": payload.as_ref().and_then(|p| p.transaction_id.clone()),
    "orderStatus": order.as_ref().map(|o| o.order_status),
    "paymentStatus": order.as_ref().map(|o| o.payment_status),
    "stock": stock,
  });

  match result {
    Ok(_) => match outcome {
      CallbackOutcome::Paid | CallbackOutcome::Duplicate => {
        let label = if outcome == CallbackOutcome::Paid { "paid" } else { "duplicate" };
        audit(state, &reference, label, metadata);
        redirect(success_location(state, &reference))
      }
      CallbackOutcome::Failed { message } => {
        audit(state, &reference, "failed", metadata);
        redirect(failure_location(state, order_ref.as_deref(), &message))
      }
      CallbackOutcome::Undecided => {
        audit(state, &reference, "undecided", metadata);
        redirect(failure_location(state, order_ref.as_deref(), "Payment could not be confirmed"))
      }
    },
    Err(e) => {
      warn!(order_ref = %reference, error = %e, "Payment callback processing failed.");
      metadata["error"] = json!(e.to_string());
      audit(state, &reference, "error", metadata);
      redirect(failure_location(state, order_ref.as_deref(), &public_message(&e)))
    }
  }
}

fn audit(state: &AppState, reference: &str, outcome: &str, metadata: serde_json::Value) {
  info!(order_ref = %reference, outcome, "Payment callback outcome.");
  let mut metadata = metadata;
  metadata["outcome"] = json!(outcome);
  state.activity.record(
    ActivityRecord::new(
      "payment_gateway",
      "payment_callback",
      format!("Payment callback for {}: {}", reference, outcome),
    )
    .with_metadata(metadata),
  );
}

fn public_message(err: &AppError) -> String {
  match err {
    AppError::OrderNotFound(_) => "Order not found".to_string(),
    AppError::MalformedPayload(_) => "Invalid payment response".to_string(),
    _ => "Payment could not be processed".to_string(),
  }
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
  let query = serde_urlencoded::to_string(pairs).unwrap_or_default();
  if query.is_empty() {
    return path.to_string();
  }
  let separator = if path.contains('?') { '&' } else { '?' };
  format!("{}{}{}", path, separator, query)
}

fn success_location(state: &AppState, order_number: &str) -> String {
  with_query(&state.config.redirects.success_path, &[("order", order_number)])
}

fn failure_location(state: &AppState, order_ref: Option<&str>, message: &str) -> String {
  let mut pairs = Vec::with_capacity(2);
  if let Some(order_ref) = order_ref {
    pairs.push(("order", order_ref));
  }
  pairs.push(("message", message));
  with_query(&state.config.redirects.failure_path, &pairs)
}

fn redirect(location: String) -> HttpResponse {
  HttpResponse::SeeOther().insert_header((LOCATION, location)).finish()
}
