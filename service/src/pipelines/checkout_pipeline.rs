// service/src/pipelines/checkout_pipeline.rs

//! Payment initiation for a pending order, in one of three modes.
//!
//! `direct` captures synchronously and finalizes the order here. `three_d`
//! and `hosted` only start the payment; the provider callback finishes it.

use crate::errors::AppError;
use crate::gateways::payment::{CallbackUrls, CardData, PaymentResult};
use crate::gateways::GatewayError;
use crate::lifecycle::{find_by_reference, PaymentCapture, PaymentFinalization, Transition};
use crate::models::{
  AttemptSettlement, AttemptStatus, NewPaymentAttempt, Order, OrderStatus, PaymentMode, PaymentStatus,
};
use crate::pipelines::contexts::CheckoutCtx;
use crate::services::payment_outcome;
use crate::state::AppState;
use parcelpay_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const MAX_INSTALLMENTS: u32 = 12;

pub fn register_checkout_pipeline(registry: &Registry<AppError>) {
  let not_direct: SkipCondition<CheckoutCtx> =
    Arc::new(|ctx: &ContextData<CheckoutCtx>| ctx.read().mode != PaymentMode::Direct);

  let mut p = Pipeline::<CheckoutCtx, AppError>::new(&[
    ("load_order", false, None),
    ("validate_request", false, None),
    ("record_attempt", false, None),
    ("call_gateway", false, None),
    ("finalize_direct", false, Some(not_direct)),
  ])
  .named("checkout");

  p.on("load_order", load_order);
  p.on("validate_request", validate_request);
  p.on("record_attempt", record_attempt);
  p.on("call_gateway", call_gateway);
  p.on("finalize_direct", finalize_direct);

  registry.register_pipeline(p);
}

fn order_of(ctx: &ContextData<CheckoutCtx>) -> Result<Order, AppError> {
  ctx
    .with(|c| c.order.clone())
    .ok_or_else(|| AppError::Internal("order not loaded".to_string()))
}

async fn load_order(ctx: ContextData<CheckoutCtx>) -> Result<PipelineControl, AppError> {
  let (state, order_number) = ctx.with(|c| (c.app_state.clone(), c.order_number.clone()));
  let order = find_by_reference(state.orders.as_ref(), &order_number)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(order_number.clone()))?;

  if order.order_status != OrderStatus::Pending || order.payment_status != PaymentStatus::Pending {
    return Err(AppError::Conflict(format!(
      "order {} cannot be paid in state ({}, {})",
      order.order_number, order.order_status, order.payment_status
    )));
  }
  ctx.update(|c| c.order = Some(order));
  Ok(PipelineControl::Continue)
}

/// Checks mode-specific inputs before anything is recorded.
pub fn validate_checkout(
  mode: PaymentMode,
  installments: u32,
  card: Option<&CardData>,
  customer_phone: Option<&str>,
) -> Result<(), AppError> {
  if !(1..=MAX_INSTALLMENTS).contains(&installments) {
    return Err(AppError::Validation(format!(
      "installments must be between 1 and {}",
      MAX_INSTALLMENTS
    )));
  }
  match mode {
    PaymentMode::Direct | PaymentMode::ThreeD => {
      let card = card.ok_or_else(|| AppError::Validation(format!("card is required for {} payments", mode.as_str())))?;
      card.validate().map_err(AppError::Validation)
    }
    PaymentMode::Hosted => match customer_phone.map(str::trim) {
      Some(phone) if !phone.is_empty() => Ok(()),
      _ => Err(AppError::Validation("customer phone is required for hosted payments".to_string())),
    },
  }
}

async fn validate_request(ctx: ContextData<CheckoutCtx>) -> Result<PipelineControl, AppError> {
  let order = order_of(&ctx)?;
  ctx.update(|c| {
    if c.customer_phone.as_deref().map_or(true, |p| p.trim().is_empty()) && !order.shipping_address.phone.is_empty() {
      c.customer_phone = Some(order.shipping_address.phone.clone());
    }
    validate_checkout(c.mode, c.installments, c.card.as_ref(), c.customer_phone.as_deref())
  })?;
  Ok(PipelineControl::Continue)
}

async fn record_attempt(ctx: ContextData<CheckoutCtx>) -> Result<PipelineControl, AppError> {
  let (state, mode, installments) = ctx.with(|c| (c.app_state.clone(), c.mode, c.installments));
  let order = order_of(&ctx)?;
  let attempt = state
    .orders
    .record_payment_attempt(NewPaymentAttempt {
      order_id: order.id,
      amount: order.total,
      mode,
      installments,
    })
    .await?;
  info!(order_number = %order.order_number, attempt_id = %attempt.id, mode = mode.as_str(), "Payment attempt recorded.");
  ctx.update(|c| c.attempt = Some(attempt));
  Ok(PipelineControl::Continue)
}

async fn send_to_gateway(state: &AppState, ctx: &ContextData<CheckoutCtx>, order: &Order) -> Result<PaymentResult, GatewayError> {
  let (mode, installments, card, phone) =
    ctx.with(|c| (c.mode, c.installments, c.card.clone(), c.customer_phone.clone().unwrap_or_default()));
  let callback_url = state.config.payment_callback_url();
  let gateway = state.payments.as_ref();

  match (mode, card) {
    (PaymentMode::Direct, Some(card)) => {
      gateway
        .process_direct(&order.order_number, order.total, &card, installments)
        .await
    }
    (PaymentMode::ThreeD, Some(card)) => {
      let callbacks = CallbackUrls {
        success_url: callback_url.clone(),
        failure_url: callback_url,
      };
      gateway
        .init_redirect_payment(&order.order_number, order.total, &card, installments, &callbacks)
        .await
    }
    (PaymentMode::Hosted, _) => {
      gateway
        .init_hosted_payment(&order.order_number, order.total, &phone, &callback_url)
        .await
    }
    (_, None) => Err(GatewayError::Rejected {
      code: "NO_CARD".to_string(),
      message: "card data missing".to_string(),
    }),
  }
}

fn failure_label(err: &GatewayError) -> &'static str {
  match err {
    GatewayError::Rejected { .. } => "failed",
    GatewayError::Unreachable(_) => "unreachable",
    GatewayError::MalformedResponse(_) => "error",
  }
}

/// Settles the attempt as failed and, for a declined direct capture,
/// cancels the order. Returns the order as it stands afterwards.
async fn settle_failure(state: &AppState, order: &Order, mode: PaymentMode, err: &GatewayError) -> Result<Order, AppError> {
  state
    .orders
    .settle_payment_attempt(
      order.id,
      AttemptSettlement {
        status: AttemptStatus::Failed,
        gateway_transaction_id: None,
        raw_response: None,
        failure_reason: Some(err.to_string()),
      },
    )
    .await?;
  // Only a definite decline of a direct capture ends the order; a
  // transport failure leaves it payable.
  if let (PaymentMode::Direct, GatewayError::Rejected { message, .. }) = (mode, err) {
    let outcome = payment_outcome::record_failure(state, order, message, None).await?;
    return Ok(outcome.order);
  }
  Ok(order.clone())
}

#[instrument(name = "checkout::call_gateway", skip_all)]
async fn call_gateway(ctx: ContextData<CheckoutCtx>) -> Result<PipelineControl, AppError> {
  let (state, mode) = ctx.with(|c| (c.app_state.clone(), c.mode));
  let order = order_of(&ctx)?;

  let result = match send_to_gateway(&state, &ctx, &order).await {
    Ok(result) => result,
    Err(e) => {
      warn!(order_number = %order.order_number, mode = mode.as_str(), error = %e, "Payment gateway call failed.");
      let settled = settle_failure(&state, &order, mode, &e).await;
      if mode == PaymentMode::Direct {
        let (code, message) = match &e {
          GatewayError::Rejected { code, message } => (Some(code.clone()), message.clone()),
          other => (None, other.to_string()),
        };
        let mut metadata = json!({ "resultCode": code, "message": message, "transactionId": null });
        if let Err(store_err) = &settled {
          metadata["error"] = json!(store_err.to_string());
        }
        let current = settled.as_ref().unwrap_or(&order);
        payment_outcome::audit_direct(&state, current, failure_label(&e), metadata);
      }
      settled?;
      return Err(e.into());
    }
  };

  match mode {
    PaymentMode::Direct => {
      ctx.update(|c| {
        c.transaction_id = result.transaction_id.clone();
        c.gateway_raw = Some(result.raw.clone());
      });
    }
    PaymentMode::ThreeD | PaymentMode::Hosted => {
      let redirect_url = result
        .redirect_url
        .clone()
        .ok_or_else(|| AppError::GatewayMalformed("provider returned no redirect URL".to_string()))?;
      info!(order_number = %order.order_number, mode = mode.as_str(), "Payment redirect issued.");
      ctx.update(|c| {
        c.redirect_url = Some(redirect_url);
        c.gateway_raw = Some(result.raw.clone());
      });
    }
  }
  Ok(PipelineControl::Continue)
}

async fn capture_direct(
  state: &AppState,
  order: &Order,
  transaction_id: Option<String>,
  raw: Option<serde_json::Value>,
) -> Result<PaymentFinalization, AppError> {
  state
    .orders
    .settle_payment_attempt(
      order.id,
      AttemptSettlement {
        status: AttemptStatus::Paid,
        gateway_transaction_id: transaction_id.clone(),
        raw_response: raw.clone(),
        failure_reason: None,
      },
    )
    .await?;
  payment_outcome::finalize_success(
    state,
    order,
    PaymentCapture {
      transaction_id,
      payload: raw,
    },
  )
  .await
}

async fn finalize_direct(ctx: ContextData<CheckoutCtx>) -> Result<PipelineControl, AppError> {
  let (state, transaction_id, raw) = ctx.with(|c| (c.app_state.clone(), c.transaction_id.clone(), c.gateway_raw.clone()));
  let order = order_of(&ctx)?;

  let metadata = json!({ "resultCode": null, "transactionId": transaction_id, "message": null });
  let finalization = match capture_direct(&state, &order, transaction_id, raw).await {
    Ok(finalization) => finalization,
    Err(e) => {
      let mut metadata = metadata;
      metadata["error"] = json!(e.to_string());
      payment_outcome::audit_direct(&state, &order, "error", metadata);
      return Err(e);
    }
  };

  let mut metadata = metadata;
  metadata["stock"] = json!(finalization.stock);
  payment_outcome::audit_direct(&state, &finalization.order, "paid", metadata);
  if finalization.transition == Transition::Applied {
    payment_outcome::post_payment_effects(&state, &finalization.order).await;
  }
  ctx.update(|c| {
    c.stock = Some(finalization.stock);
    c.order = Some(finalization.order);
  });
  Ok(PipelineControl::Continue)
}
