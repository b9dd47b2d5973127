// service/src/pipelines/payment_callback_pipeline.rs

//! Provider callback after a 3-D or hosted payment.
//!
//! `(PENDING, PENDING)` moves to `(PROCESSING, PAID)` on success or to
//! `(CANCELLED, FAILED)` on failure. A callback for an order that is already
//! paid stops at `guard_duplicate`, so replays never re-run stock or cart
//! effects.

use crate::errors::AppError;
use crate::gateways::payment::envelope::ProviderResponse;
use crate::gateways::payment::{is_success_code, LogicalField};
use crate::lifecycle::{find_by_reference, PaymentCapture, Transition};
use crate::models::{AttemptSettlement, AttemptStatus, OrderStatus, PaymentStatus};
use crate::pipelines::contexts::{CallbackOutcome, CallbackPayload, PaymentCallbackCtx};
use crate::services::payment_outcome;
use parcelpay_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub fn register_payment_callback_pipeline(registry: &Registry<AppError>) {
  let not_newly_paid: SkipCondition<PaymentCallbackCtx> = Arc::new(|ctx: &ContextData<PaymentCallbackCtx>| !ctx.read().newly_paid);

  let mut p = Pipeline::<PaymentCallbackCtx, AppError>::new(&[
    ("parse_payload", false, None),
    ("resolve_order", false, None),
    ("guard_duplicate", false, None),
    ("settle_attempt", true, None),
    ("apply_outcome", false, None),
    ("post_payment_effects", true, Some(not_newly_paid)),
  ])
  .named("payment_callback");

  p.on("parse_payload", parse_payload);
  p.on("resolve_order", resolve_order);
  p.on("guard_duplicate", guard_duplicate);
  p.on("settle_attempt", settle_attempt);
  p.on("apply_outcome", apply_outcome);
  p.on("post_payment_effects", post_payment_effects);

  registry.register_pipeline(p);
}

/// Pulls the logical values out of whichever dialect the provider used.
pub fn parse_callback_fields(fields: &[(String, String)]) -> Result<CallbackPayload, AppError> {
  let response = ProviderResponse::from_pairs(fields.iter().cloned());
  let order_ref = response
    .get(LogicalField::OrderRef)
    .ok_or_else(|| AppError::MalformedPayload("callback carries no order reference".to_string()))?;
  let result_code = response
    .get(LogicalField::ResultCode)
    .ok_or_else(|| AppError::MalformedPayload(format!("callback for {} carries no result code", order_ref)))?;

  Ok(CallbackPayload {
    order_ref: order_ref.to_string(),
    result_code: result_code.to_string(),
    success: is_success_code(result_code),
    message: response.get(LogicalField::ResultMessage).map(str::to_string),
    transaction_id: response.get(LogicalField::TransactionId).map(str::to_string),
    raw: response.to_json(),
  })
}

#[instrument(name = "payment_callback::parse_payload", skip_all)]
async fn parse_payload(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let fields = ctx.with(|c| c.fields.clone());
  let payload = parse_callback_fields(&fields)?;
  info!(
    order_ref = %payload.order_ref,
    result_code = %payload.result_code,
    success = payload.success,
    "Payment callback parsed."
  );
  ctx.update(|c| c.payload = Some(payload));
  Ok(PipelineControl::Continue)
}

fn payload_of(ctx: &ContextData<PaymentCallbackCtx>) -> Result<CallbackPayload, AppError> {
  ctx
    .with(|c| c.payload.clone())
    .ok_or_else(|| AppError::Internal("callback payload not parsed".to_string()))
}

async fn resolve_order(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let state = ctx.with(|c| c.app_state.clone());
  let payload = payload_of(&ctx)?;
  let order = find_by_reference(state.orders.as_ref(), &payload.order_ref)
    .await?
    .ok_or_else(|| AppError::OrderNotFound(payload.order_ref.clone()))?;
  ctx.update(|c| c.order = Some(order));
  Ok(PipelineControl::Continue)
}

async fn guard_duplicate(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let payload = payload_of(&ctx)?;
  let Some(order) = ctx.with(|c| c.order.clone()) else {
    return Err(AppError::Internal("order not resolved".to_string()));
  };

  let already_paid = order.payment_status == PaymentStatus::Paid;
  let already_failed = !payload.success
    && order.order_status == OrderStatus::Cancelled
    && order.payment_status == PaymentStatus::Failed;
  if already_paid || already_failed {
    info!(order_number = %order.order_number, "Duplicate payment callback; nothing re-applied.");
    ctx.update(|c| c.outcome = CallbackOutcome::Duplicate);
    return Ok(PipelineControl::Stop);
  }
  Ok(PipelineControl::Continue)
}

async fn settle_attempt(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let state = ctx.with(|c| c.app_state.clone());
  let payload = payload_of(&ctx)?;
  let Some(order) = ctx.with(|c| c.order.clone()) else {
    return Ok(PipelineControl::Continue);
  };

  let settlement = AttemptSettlement {
    status: if payload.success {
      AttemptStatus::Paid
    } else {
      AttemptStatus::Failed
    },
    gateway_transaction_id: payload.transaction_id.clone(),
    raw_response: Some(payload.raw.clone()),
    failure_reason: if payload.success { None } else { payload.message.clone() },
  };
  if state.orders.settle_payment_attempt(order.id, settlement).await?.is_none() {
    warn!(order_number = %order.order_number, "Callback arrived without a pending payment attempt.");
  }
  Ok(PipelineControl::Continue)
}

async fn apply_outcome(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let state = ctx.with(|c| c.app_state.clone());
  let payload = payload_of(&ctx)?;
  let Some(order) = ctx.with(|c| c.order.clone()) else {
    return Err(AppError::Internal("order not resolved".to_string()));
  };

  if payload.success {
    let capture = PaymentCapture {
      transaction_id: payload.transaction_id.clone(),
      payload: Some(payload.raw.clone()),
    };
    let finalization = payment_outcome::finalize_success(&state, &order, capture).await?;
    let newly_paid = finalization.transition == Transition::Applied;
    ctx.update(|c| {
      c.outcome = if newly_paid {
        CallbackOutcome::Paid
      } else {
        CallbackOutcome::Duplicate
      };
      c.newly_paid = newly_paid;
      c.stock = Some(finalization.stock);
      c.order = Some(finalization.order);
    });
  } else {
    let message = payload
      .message
      .clone()
      .unwrap_or_else(|| format!("Payment declined (code {})", payload.result_code));
    let outcome = payment_outcome::record_failure(&state, &order, &message, Some(payload.raw.clone())).await?;
    ctx.update(|c| {
      c.outcome = CallbackOutcome::Failed { message };
      c.order = Some(outcome.order);
    });
  }
  Ok(PipelineControl::Continue)
}

async fn post_payment_effects(ctx: ContextData<PaymentCallbackCtx>) -> Result<PipelineControl, AppError> {
  let (state, order) = ctx.with(|c| (c.app_state.clone(), c.order.clone()));
  if let Some(order) = order {
    payment_outcome::post_payment_effects(&state, &order).await;
  }
  Ok(PipelineControl::Continue)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  #[test]
  fn legacy_dialect() {
    let payload = parse_callback_fields(&fields(&[
      ("TURKPOS_RETVAL_Siparis_ID", "ORD-20260309-A1B2C3"),
      ("TURKPOS_RETVAL_Sonuc", "1"),
      ("TURKPOS_RETVAL_Sonuc_Str", "Odeme Islemi Basarili"),
      ("TURKPOS_RETVAL_Dekont_ID", "5551234"),
    ]))
    .unwrap();
    assert_eq!(payload.order_ref, "ORD-20260309-A1B2C3");
    assert!(payload.success);
    assert_eq!(payload.transaction_id.as_deref(), Some("5551234"));
  }

  #[test]
  fn modal_dialect_failure() {
    let payload = parse_callback_fields(&fields(&[
      ("orderId", "ORD-20260309-A1B2C3"),
      ("resultCode", "-2"),
      ("resultMessage", "Yetersiz bakiye"),
    ]))
    .unwrap();
    assert!(!payload.success);
    assert_eq!(payload.message.as_deref(), Some("Yetersiz bakiye"));
  }

  #[test]
  fn missing_reference_is_malformed() {
    let err = parse_callback_fields(&fields(&[("Sonuc", "1")])).unwrap_err();
    assert!(matches!(err, AppError::MalformedPayload(_)));
    let err = parse_callback_fields(&fields(&[("Siparis_ID", "ORD-1")])).unwrap_err();
    assert!(matches!(err, AppError::MalformedPayload(_)));
  }
}
