// service/src/services/tracking.rs

//! The one carrier-status mapping used by both the shipping webhook and the
//! reconciliation scheduler.
//!
//! Mapping is forward-only: `PICKED_UP`/`IN_TRANSIT` ship a `PROCESSING`
//! order, `DELIVERED` delivers any non-terminal paid order, `RETURNED`
//! cancels it. Anything that would move an order backwards resolves to
//! `Transition::Unchanged` inside the guarded transitions, so applying the
//! same status twice, or from either source, ends in the same state.

use crate::gateways::shipping::CarrierStatus;
use crate::lifecycle::{OrderChange, OrderStore, StatusTransition, StoreError, Transition};
use crate::models::{Order, OrderStatus, ShipmentInfo};

pub fn carrier_transition(status: &CarrierStatus) -> Option<StatusTransition> {
  match status {
    CarrierStatus::PickedUp | CarrierStatus::InTransit => Some(StatusTransition::Shipped),
    CarrierStatus::Delivered => Some(StatusTransition::Delivered),
    CarrierStatus::Returned => Some(StatusTransition::Returned),
    CarrierStatus::Other(_) => None,
  }
}

/// Carrier data to merge into an order. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TrackingUpdate {
  pub status: Option<CarrierStatus>,
  pub patch: ShipmentInfo,
}

#[derive(Debug, Clone)]
pub struct TrackingApplied {
  pub order: Order,
  pub previous_status: OrderStatus,
  pub status_changed: bool,
  pub fields_changed: bool,
  /// Set when the carrier status could not be applied to the order's state.
  pub ignored_reason: Option<String>,
}

impl TrackingApplied {
  pub fn changed(&self) -> bool {
    self.status_changed || self.fields_changed
  }
}

pub async fn apply_tracking_update(
  store: &dyn OrderStore,
  order: &Order,
  update: TrackingUpdate,
) -> Result<TrackingApplied, StoreError> {
  let mut patch = update.patch;
  if let Some(status) = &update.status {
    patch.tracking_status = Some(status.code().to_string());
  }
  let change = OrderChange::carrier(update.status.as_ref().and_then(carrier_transition), patch);

  match store.apply_change(order.id, change.clone()).await {
    Ok(outcome) => {
      if outcome.status == Transition::Applied {
        tracing::info!(
          order_number = %order.order_number,
          from = %outcome.previous_status,
          to = %outcome.order.order_status,
          "Order status advanced from carrier update."
        );
      }
      Ok(TrackingApplied {
        status_changed: outcome.status == Transition::Applied,
        fields_changed: outcome.fields_changed,
        previous_status: outcome.previous_status,
        order: outcome.order,
        ignored_reason: None,
      })
    }
    Err(StoreError::IllegalTransition {
      transition,
      order_status,
      payment_status,
      ..
    }) => {
      let reason = format!(
        "{} not applicable in state ({}, {})",
        transition, order_status, payment_status
      );
      tracing::warn!(order_number = %order.order_number, %reason, "Carrier status ignored.");
      let outcome = store.apply_change(order.id, change.fields_only()).await?;
      Ok(TrackingApplied {
        status_changed: false,
        fields_changed: outcome.fields_changed,
        previous_status: outcome.previous_status,
        order: outcome.order,
        ignored_reason: Some(reason),
      })
    }
    Err(e) => Err(e),
  }
}
