// service/src/services/payment_outcome.rs

//! What happens to an order once the gateway has answered, shared by the
//! payment callback and direct checkout.

use crate::activity::ActivityRecord;
use crate::errors::AppError;
use crate::lifecycle::{ChangeOutcome, OrderChange, PaymentCapture, PaymentFinalization, StockOutcome};
use crate::models::Order;
use crate::state::AppState;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

/// Moves the order to `(PROCESSING, PAID)` and decrements stock.
///
/// A stock failure does not fail the call; the order stays paid and the
/// finalization reports it.
#[instrument(name = "payment_outcome::finalize_success", skip(state, order, capture), fields(order_number = %order.order_number))]
pub async fn finalize_success(
  state: &AppState,
  order: &Order,
  capture: PaymentCapture,
) -> Result<PaymentFinalization, AppError> {
  let finalization = state.orders.finalize_payment(order.id, capture).await?;
  match &finalization.stock {
    StockOutcome::Failed { reason } => {
      warn!(%reason, "Payment captured but stock was not decremented; manual reconciliation needed.");
      state.activity.record(
        ActivityRecord::new(
          "system",
          "stock_reconciliation_warning",
          format!("Stock not decremented for paid order {}", order.order_number),
        )
        .with_metadata(json!({
          "orderNumber": order.order_number,
          "orderId": order.id,
          "reason": reason,
        })),
      );
    }
    StockOutcome::Decremented { lines } => info!(lines, "Order paid and stock decremented."),
    StockOutcome::NotAttempted => info!("Order was already paid; nothing re-applied."),
  }
  Ok(finalization)
}

/// Side effects that belong to the first successful payment only: emptying
/// the buyer's cart and, when enabled, booking the shipment in the background.
pub async fn post_payment_effects(state: &AppState, order: &Order) {
  if let Some(user_id) = order.user_id {
    match state.carts.clear_cart(user_id).await {
      Ok(removed) => info!(order_number = %order.order_number, removed, "Cart cleared after payment."),
      Err(e) => warn!(order_number = %order.order_number, error = %e, "Cart clear failed after payment."),
    }
  }

  if state.config.shipping.auto_create_on_payment {
    let shipments = state.shipments.clone();
    let key = crate::models::OrderKey::Id(order.id);
    let order_number = order.order_number.clone();
    tokio::spawn(async move {
      if let Err(e) = shipments.create_for_order(&key).await {
        warn!(%order_number, error = %e, "Automatic shipment creation failed.");
      }
    });
  }
}

/// Moves the order to `(CANCELLED, FAILED)`. Stock is never touched.
#[instrument(name = "payment_outcome::record_failure", skip(state, order, payload), fields(order_number = %order.order_number))]
pub async fn record_failure(
  state: &AppState,
  order: &Order,
  message: &str,
  payload: Option<serde_json::Value>,
) -> Result<ChangeOutcome, AppError> {
  let outcome = state.orders.apply_change(order.id, OrderChange::payment_failed(payload)).await?;
  warn!(%message, "Payment failed; order cancelled.");
  Ok(outcome)
}

/// Writes the activity record of a direct capture. `metadata` is extended
/// with the order's resulting status pair and `outcome`.
pub fn audit_direct(state: &AppState, order: &Order, outcome: &str, metadata: Value) {
  info!(order_number = %order.order_number, outcome, "Direct payment outcome.");
  let mut metadata = metadata;
  metadata["orderRef"] = json!(order.order_number);
  metadata["orderStatus"] = json!(order.order_status);
  metadata["paymentStatus"] = json!(order.payment_status);
  metadata["outcome"] = json!(outcome);
  state.activity.record(
    ActivityRecord::new(
      "payment_gateway",
      "payment_direct",
      format!("Direct payment for {}: {}", order.order_number, outcome),
    )
    .with_metadata(metadata),
  );
}
