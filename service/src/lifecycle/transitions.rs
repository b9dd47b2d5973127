// service/src/lifecycle/transitions.rs

//! Named, guarded status transitions on [`Order`].
//!
//! Each transition checks the current `(orderStatus, paymentStatus)` pair and
//! either applies, reports `Unchanged` (already at or past the target), or
//! refuses with `StoreError::IllegalTransition`. Applying any of them twice
//! yields the same state as applying it once.

use crate::lifecycle::StoreError;
use crate::models::{Order, OrderStatus, PaymentStatus, ShipmentInfo};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
  Applied,
  Unchanged,
}

/// Status moves that callers other than payment finalization may request.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusTransition {
  PaymentFailed { payload: Option<serde_json::Value> },
  Shipped,
  Delivered,
  Returned,
}

impl StatusTransition {
  pub fn label(&self) -> &'static str {
    match self {
      StatusTransition::PaymentFailed { .. } => "mark_payment_failed",
      StatusTransition::Shipped => "mark_shipped",
      StatusTransition::Delivered => "mark_delivered",
      StatusTransition::Returned => "mark_returned",
    }
  }
}

/// A single atomic write: an optional status transition plus shipment fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChange {
  pub transition: Option<StatusTransition>,
  pub shipment: ShipmentInfo,
}

impl OrderChange {
  pub fn payment_failed(payload: Option<serde_json::Value>) -> Self {
    Self {
      transition: Some(StatusTransition::PaymentFailed { payload }),
      shipment: ShipmentInfo::default(),
    }
  }

  pub fn shipment(patch: ShipmentInfo) -> Self {
    Self {
      transition: None,
      shipment: patch,
    }
  }

  pub fn carrier(transition: Option<StatusTransition>, patch: ShipmentInfo) -> Self {
    Self {
      transition,
      shipment: patch,
    }
  }

  /// Same change without the status part.
  pub fn fields_only(&self) -> Self {
    Self::shipment(self.shipment.clone())
  }
}

#[derive(Debug, Clone)]
pub struct ChangeOutcome {
  pub order: Order,
  pub previous_status: OrderStatus,
  pub status: Transition,
  pub fields_changed: bool,
}

impl ChangeOutcome {
  pub fn changed(&self) -> bool {
    self.status == Transition::Applied || self.fields_changed
  }
}

impl Order {
  fn illegal(&self, transition: &'static str) -> StoreError {
    StoreError::IllegalTransition {
      order_number: self.order_number.clone(),
      transition,
      order_status: self.order_status,
      payment_status: self.payment_status,
    }
  }

  fn set_status(&mut self, order_status: OrderStatus, payment_status: PaymentStatus) {
    self.order_status = order_status;
    self.payment_status = payment_status;
    self.updated_at = Utc::now();
  }

  /// `(PENDING, PENDING) -> (PROCESSING, PAID)`.
  pub fn mark_paid(
    &mut self,
    transaction_id: Option<String>,
    payload: Option<serde_json::Value>,
  ) -> Result<Transition, StoreError> {
    match (self.order_status, self.payment_status) {
      (_, PaymentStatus::Paid) => Ok(Transition::Unchanged),
      (OrderStatus::Pending, PaymentStatus::Pending) => {
        self.set_status(OrderStatus::Processing, PaymentStatus::Paid);
        if transaction_id.is_some() {
          self.payment_transaction_id = transaction_id;
        }
        if payload.is_some() {
          self.payment_payload = payload;
        }
        Ok(Transition::Applied)
      }
      _ => Err(self.illegal("mark_paid")),
    }
  }

  /// `(PENDING, PENDING) -> (CANCELLED, FAILED)`. A paid order is never failed.
  pub fn mark_payment_failed(&mut self, payload: Option<serde_json::Value>) -> Result<Transition, StoreError> {
    match (self.order_status, self.payment_status) {
      (OrderStatus::Cancelled, PaymentStatus::Failed) => Ok(Transition::Unchanged),
      (OrderStatus::Pending, PaymentStatus::Pending) => {
        self.set_status(OrderStatus::Cancelled, PaymentStatus::Failed);
        if payload.is_some() {
          self.payment_payload = payload;
        }
        Ok(Transition::Applied)
      }
      _ => Err(self.illegal("mark_payment_failed")),
    }
  }

  /// `PROCESSING -> SHIPPED`; later states are left alone.
  pub fn mark_shipped(&mut self) -> Result<Transition, StoreError> {
    if self.payment_status != PaymentStatus::Paid {
      return Err(self.illegal("mark_shipped"));
    }
    match self.order_status {
      OrderStatus::Processing => {
        self.set_status(OrderStatus::Shipped, PaymentStatus::Paid);
        Ok(Transition::Applied)
      }
      OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Cancelled => Ok(Transition::Unchanged),
      OrderStatus::Pending => Err(self.illegal("mark_shipped")),
    }
  }

  /// `PROCESSING | SHIPPED -> DELIVERED`.
  pub fn mark_delivered(&mut self) -> Result<Transition, StoreError> {
    if self.payment_status != PaymentStatus::Paid {
      return Err(self.illegal("mark_delivered"));
    }
    match self.order_status {
      OrderStatus::Processing | OrderStatus::Shipped => {
        self.set_status(OrderStatus::Delivered, PaymentStatus::Paid);
        Ok(Transition::Applied)
      }
      OrderStatus::Delivered | OrderStatus::Cancelled => Ok(Transition::Unchanged),
      OrderStatus::Pending => Err(self.illegal("mark_delivered")),
    }
  }

  /// `PROCESSING | SHIPPED -> CANCELLED`; payment stays PAID.
  pub fn mark_returned(&mut self) -> Result<Transition, StoreError> {
    if self.payment_status != PaymentStatus::Paid {
      return Err(self.illegal("mark_returned"));
    }
    match self.order_status {
      OrderStatus::Processing | OrderStatus::Shipped => {
        self.set_status(OrderStatus::Cancelled, PaymentStatus::Paid);
        Ok(Transition::Applied)
      }
      OrderStatus::Delivered | OrderStatus::Cancelled => Ok(Transition::Unchanged),
      OrderStatus::Pending => Err(self.illegal("mark_returned")),
    }
  }

  /// Whether the status pair is reachable through the transitions above.
  pub fn is_consistent(&self) -> bool {
    matches!(
      (self.order_status, self.payment_status),
      (OrderStatus::Pending, PaymentStatus::Pending)
        | (OrderStatus::Processing, PaymentStatus::Paid)
        | (OrderStatus::Shipped, PaymentStatus::Paid)
        | (OrderStatus::Delivered, PaymentStatus::Paid)
        | (OrderStatus::Cancelled, PaymentStatus::Failed)
        | (OrderStatus::Cancelled, PaymentStatus::Paid)
        | (OrderStatus::Cancelled, PaymentStatus::Refunded)
    )
  }

  /// Applies `change` to this order in memory. On error the order is unchanged.
  pub fn apply(&mut self, change: &OrderChange) -> Result<ChangeOutcome, StoreError> {
    let previous_status = self.order_status;
    let mut staged = self.clone();
    let status = match &change.transition {
      None => Transition::Unchanged,
      Some(StatusTransition::PaymentFailed { payload }) => staged.mark_payment_failed(payload.clone())?,
      Some(StatusTransition::Shipped) => staged.mark_shipped()?,
      Some(StatusTransition::Delivered) => staged.mark_delivered()?,
      Some(StatusTransition::Returned) => staged.mark_returned()?,
    };
    let mut patch = change.shipment.clone();
    // A finished order keeps the carrier status that finished it.
    if previous_status.is_terminal() {
      patch.tracking_status = None;
    }
    let fields_changed = staged.shipment.merge(&patch);
    if fields_changed {
      staged.updated_at = Utc::now();
    }
    *self = staged;
    Ok(ChangeOutcome {
      order: self.clone(),
      previous_status,
      status,
      fields_changed,
    })
  }
}
