// service/src/lifecycle/mod.rs

//! Order Lifecycle Store: the only writer of order and payment status.
//!
//! Every write goes through a named transition (see [`transitions`]) applied
//! under the store's own atomicity (a lock for the in-memory store, a
//! `SELECT ... FOR UPDATE` transaction for Postgres), so concurrent writers
//! cannot clobber each other's fields.

pub mod memory;
pub mod postgres;
pub mod transitions;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;
pub use transitions::{ChangeOutcome, OrderChange, StatusTransition, Transition};

use crate::models::{
  AttemptSettlement, NewOrder, NewPaymentAttempt, NewWebhookDelivery, Order, OrderItem, OrderKey, OrderStatus,
  PaymentAttempt, PaymentStatus, WebhookDelivery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Order not found: {0}")]
  NotFound(String),

  #[error("Illegal transition '{transition}' for order {order_number} in state ({order_status}, {payment_status})")]
  IllegalTransition {
    order_number: String,
    transition: &'static str,
    order_status: OrderStatus,
    payment_status: PaymentStatus,
  },
}

/// Gateway data stored with a successful payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentCapture {
  pub transaction_id: Option<String>,
  pub payload: Option<serde_json::Value>,
}

/// What happened to inventory when a payment was finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockOutcome {
  /// The order was already paid; inventory was not touched again.
  NotAttempted,
  Decremented { lines: usize },
  /// Payment stands; inventory needs manual reconciliation.
  Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct PaymentFinalization {
  pub order: Order,
  pub transition: Transition,
  pub stock: StockOutcome,
}

impl PaymentFinalization {
  pub fn needs_stock_reconciliation(&self) -> bool {
    matches!(self.stock, StockOutcome::Failed { .. })
  }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Persists a new `(PENDING, PENDING)` order under a fresh order number.
  async fn create_order(&self, new: NewOrder) -> Result<Order, StoreError>;

  async fn find_order(&self, key: &OrderKey) -> Result<Option<Order>, StoreError>;

  async fn find_by_shipment_id(&self, shipment_id: &str) -> Result<Option<Order>, StoreError>;

  /// Orders not yet delivered or cancelled that carry a shipment id.
  async fn open_shipment_orders(&self) -> Result<Vec<Order>, StoreError>;

  /// Applies `change` atomically. An illegal transition leaves the order untouched.
  async fn apply_change(&self, order_id: Uuid, change: OrderChange) -> Result<ChangeOutcome, StoreError>;

  /// Marks the order paid and decrements stock for its tracked lines.
  ///
  /// The PAID write survives a stock failure; the failure is reported in
  /// [`PaymentFinalization::stock`]. Stock is only touched by the call that
  /// actually moves the order to PAID.
  async fn finalize_payment(&self, order_id: Uuid, capture: PaymentCapture) -> Result<PaymentFinalization, StoreError>;

  async fn record_payment_attempt(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, StoreError>;

  /// Settles the most recent pending attempt of the order, if any.
  async fn settle_payment_attempt(
    &self,
    order_id: Uuid,
    settlement: AttemptSettlement,
  ) -> Result<Option<PaymentAttempt>, StoreError>;

  async fn payment_attempts(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StoreError>;

  async fn record_webhook_delivery(&self, delivery: NewWebhookDelivery) -> Result<WebhookDelivery, StoreError>;

  /// Most recent deliveries first.
  async fn webhook_deliveries(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StoreError>;
}

/// Resolves a reference that may be either the order id or its number.
pub async fn find_by_reference(store: &dyn OrderStore, reference: &str) -> Result<Option<Order>, StoreError> {
  let key = OrderKey::parse(reference);
  if let Some(order) = store.find_order(&key).await? {
    return Ok(Some(order));
  }
  match key {
    OrderKey::Id(_) => store.find_order(&OrderKey::Number(reference.trim().to_string())).await,
    OrderKey::Number(_) => Ok(None),
  }
}

/// Works out the per-product decrements for `items`, all or nothing.
///
/// `inventory` returns `(stock, track_stock)` for a product. Untracked
/// products are skipped; a missing row or insufficient stock fails the whole
/// plan.
pub(crate) fn plan_stock_decrement(
  items: &[OrderItem],
  inventory: impl Fn(Uuid) -> Option<(i64, bool)>,
) -> Result<Vec<(Uuid, i64)>, String> {
  let mut planned: Vec<(Uuid, i64)> = Vec::new();
  for item in items {
    let (stock, track_stock) =
      inventory(item.product_id).ok_or_else(|| format!("product {} has no inventory row", item.product_id))?;
    if !track_stock {
      continue;
    }
    let wanted = i64::from(item.quantity);
    let existing = planned.iter().position(|(id, _)| *id == item.product_id);
    let already = existing.map(|idx| planned[idx].1).unwrap_or(0);
    if stock - already < wanted {
      return Err(format!(
        "insufficient stock for product {} ({} left, {} ordered)",
        item.product_id,
        stock - already,
        wanted
      ));
    }
    match existing {
      Some(idx) => planned[idx].1 += wanted,
      None => planned.push((item.product_id, wanted)),
    }
  }
  Ok(planned)
}

/// `ORD-YYYYMMDD-XXXXXX`.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
  let suffix = Uuid::new_v4().simple().to_string()[..6].to_ascii_uppercase();
  format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}
