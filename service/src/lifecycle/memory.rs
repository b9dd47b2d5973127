// service/src/lifecycle/memory.rs

use crate::lifecycle::transitions::{ChangeOutcome, OrderChange, Transition};
use crate::lifecycle::{generate_order_number, plan_stock_decrement, OrderStore, PaymentCapture, PaymentFinalization, StockOutcome, StoreError};
use crate::models::{
  AttemptSettlement, AttemptStatus, NewOrder, NewPaymentAttempt, NewWebhookDelivery, Order, OrderItem, OrderKey,
  PaymentAttempt, WebhookDelivery,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryItem {
  pub stock: i64,
  pub track_stock: bool,
}

/// Webhook deliveries kept in memory; older ones are dropped first.
pub const MAX_DELIVERIES: usize = 1000;

#[derive(Default)]
struct MemoryState {
  orders: HashMap<Uuid, Order>,
  inventory: HashMap<Uuid, InventoryItem>,
  attempts: Vec<PaymentAttempt>,
  deliveries: VecDeque<WebhookDelivery>,
}

/// In-process order store used in development and tests.
///
/// Orders and payment attempts live for the life of the process; the
/// webhook delivery log is capped at [`MAX_DELIVERIES`].
///
/// One mutex guards orders and inventory together, which gives
/// `finalize_payment` the same all-at-once behaviour as the Postgres
/// transaction.
#[derive(Default)]
pub struct MemoryOrderStore {
  state: Mutex<MemoryState>,
  fail_stock: AtomicBool,
}

impl MemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_inventory(&self, product_id: Uuid, stock: i64, track_stock: bool) {
    self
      .state
      .lock()
      .inventory
      .insert(product_id, InventoryItem { stock, track_stock });
  }

  pub fn inventory(&self, product_id: Uuid) -> Option<InventoryItem> {
    self.state.lock().inventory.get(&product_id).copied()
  }

  /// Makes every following stock decrement fail.
  pub fn fail_stock_updates(&self, fail: bool) {
    self.fail_stock.store(fail, Ordering::SeqCst);
  }

  /// Inserts `order` as-is, for fixtures that need a specific state.
  pub fn insert_order(&self, order: Order) {
    self.state.lock().orders.insert(order.id, order);
  }

  fn decrement_stock(&self, inventory: &mut HashMap<Uuid, InventoryItem>, items: &[OrderItem]) -> StockOutcome {
    if self.fail_stock.load(Ordering::SeqCst) {
      return StockOutcome::Failed {
        reason: "inventory store unavailable".to_string(),
      };
    }
    let plan = plan_stock_decrement(items, |id| inventory.get(&id).map(|row| (row.stock, row.track_stock)));
    match plan {
      Ok(planned) => {
        let lines = planned.len();
        for (product_id, qty) in planned {
          if let Some(row) = inventory.get_mut(&product_id) {
            row.stock -= qty;
          }
        }
        StockOutcome::Decremented { lines }
      }
      Err(reason) => StockOutcome::Failed { reason },
    }
  }
}

fn not_found(order_id: Uuid) -> StoreError {
  StoreError::NotFound(order_id.to_string())
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn create_order(&self, new: NewOrder) -> Result<Order, StoreError> {
    let now = Utc::now();
    let mut state = self.state.lock();
    let mut number = generate_order_number(now);
    while state.orders.values().any(|o| o.order_number == number) {
      number = generate_order_number(now);
    }
    let order = Order::from_new(new, number, now);
    state.orders.insert(order.id, order.clone());
    tracing::debug!(order_number = %order.order_number, "Order created.");
    Ok(order)
  }

  async fn find_order(&self, key: &OrderKey) -> Result<Option<Order>, StoreError> {
    let state = self.state.lock();
    Ok(match key {
      OrderKey::Id(id) => state.orders.get(id).cloned(),
      OrderKey::Number(number) => state.orders.values().find(|o| &o.order_number == number).cloned(),
    })
  }

  async fn find_by_shipment_id(&self, shipment_id: &str) -> Result<Option<Order>, StoreError> {
    let state = self.state.lock();
    Ok(
      state
        .orders
        .values()
        .find(|o| o.shipment.shipment_id.as_deref() == Some(shipment_id))
        .cloned(),
    )
  }

  async fn open_shipment_orders(&self) -> Result<Vec<Order>, StoreError> {
    let state = self.state.lock();
    let mut open: Vec<Order> = state.orders.values().filter(|o| o.has_open_shipment()).cloned().collect();
    open.sort_by_key(|o| o.created_at);
    Ok(open)
  }

  async fn apply_change(&self, order_id: Uuid, change: OrderChange) -> Result<ChangeOutcome, StoreError> {
    let mut state = self.state.lock();
    let order = state.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;
    order.apply(&change)
  }

  async fn finalize_payment(&self, order_id: Uuid, capture: PaymentCapture) -> Result<PaymentFinalization, StoreError> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    let order = state.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;
    let transition = order.mark_paid(capture.transaction_id, capture.payload)?;
    let snapshot = order.clone();

    let stock = match transition {
      Transition::Unchanged => StockOutcome::NotAttempted,
      Transition::Applied => self.decrement_stock(&mut state.inventory, &snapshot.items),
    };
    Ok(PaymentFinalization {
      order: snapshot,
      transition,
      stock,
    })
  }

  async fn record_payment_attempt(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, StoreError> {
    let record = PaymentAttempt {
      id: Uuid::new_v4(),
      order_id: attempt.order_id,
      amount: attempt.amount,
      mode: attempt.mode,
      installments: attempt.installments,
      status: AttemptStatus::Pending,
      gateway_transaction_id: None,
      raw_response: None,
      failure_reason: None,
      created_at: Utc::now(),
      settled_at: None,
    };
    self.state.lock().attempts.push(record.clone());
    Ok(record)
  }

  async fn settle_payment_attempt(
    &self,
    order_id: Uuid,
    settlement: AttemptSettlement,
  ) -> Result<Option<PaymentAttempt>, StoreError> {
    let mut state = self.state.lock();
    let attempt = state
      .attempts
      .iter_mut()
      .rev()
      .find(|a| a.order_id == order_id && a.status == AttemptStatus::Pending);
    Ok(attempt.map(|a| {
      a.status = settlement.status;
      a.gateway_transaction_id = settlement.gateway_transaction_id;
      a.raw_response = settlement.raw_response;
      a.failure_reason = settlement.failure_reason;
      a.settled_at = Some(Utc::now());
      a.clone()
    }))
  }

  async fn payment_attempts(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StoreError> {
    let state = self.state.lock();
    Ok(state.attempts.iter().filter(|a| a.order_id == order_id).cloned().collect())
  }

  async fn record_webhook_delivery(&self, delivery: NewWebhookDelivery) -> Result<WebhookDelivery, StoreError> {
    let record = WebhookDelivery::from_new(delivery, Utc::now());
    let mut state = self.state.lock();
    if state.deliveries.len() == MAX_DELIVERIES {
      state.deliveries.pop_front();
    }
    state.deliveries.push_back(record.clone());
    Ok(record)
  }

  async fn webhook_deliveries(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StoreError> {
    let state = self.state.lock();
    Ok(state.deliveries.iter().rev().take(limit).cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{AddressSnapshot, NewOrderItem, OrderStatus, PaymentMethod, PaymentStatus};
  use rust_decimal::Decimal;

  fn new_order(items: Vec<NewOrderItem>) -> NewOrder {
    NewOrder {
      user_id: None,
      subtotal: Decimal::new(61990, 2),
      shipping_cost: Decimal::ZERO,
      tax: Decimal::ZERO,
      total: Decimal::new(61990, 2),
      payment_method: PaymentMethod::Card,
      shipping_address: AddressSnapshot::default(),
      billing_address: AddressSnapshot::default(),
      items,
    }
  }

  fn line(product_id: Uuid, quantity: i32) -> NewOrderItem {
    NewOrderItem {
      product_id,
      product_name: "Kettle".into(),
      product_image: None,
      unit_price: Decimal::new(10000, 2),
      quantity,
    }
  }

  #[tokio::test]
  async fn stock_decrement_is_all_or_nothing() {
    let store = MemoryOrderStore::new();
    let plenty = Uuid::new_v4();
    let scarce = Uuid::new_v4();
    store.set_inventory(plenty, 10, true);
    store.set_inventory(scarce, 1, true);
    let order = store.create_order(new_order(vec![line(plenty, 2), line(scarce, 3)])).await.unwrap();

    let result = store.finalize_payment(order.id, PaymentCapture::default()).await.unwrap();

    assert!(result.needs_stock_reconciliation());
    assert_eq!(result.order.payment_status, PaymentStatus::Paid);
    assert_eq!(result.order.order_status, OrderStatus::Processing);
    assert_eq!(store.inventory(plenty).unwrap().stock, 10);
    assert_eq!(store.inventory(scarce).unwrap().stock, 1);
  }

  #[tokio::test]
  async fn untracked_lines_are_skipped_and_replay_is_noop() {
    let store = MemoryOrderStore::new();
    let tracked = Uuid::new_v4();
    let untracked = Uuid::new_v4();
    store.set_inventory(tracked, 5, true);
    store.set_inventory(untracked, 0, false);
    let order = store
      .create_order(new_order(vec![line(tracked, 2), line(untracked, 4)]))
      .await
      .unwrap();

    let first = store.finalize_payment(order.id, PaymentCapture::default()).await.unwrap();
    assert_eq!(first.stock, StockOutcome::Decremented { lines: 1 });
    let second = store.finalize_payment(order.id, PaymentCapture::default()).await.unwrap();
    assert_eq!(second.transition, Transition::Unchanged);
    assert_eq!(second.stock, StockOutcome::NotAttempted);
    assert_eq!(store.inventory(tracked).unwrap().stock, 3);
    assert_eq!(store.inventory(untracked).unwrap().stock, 0);
  }

  #[tokio::test]
  async fn settles_latest_pending_attempt() {
    let store = MemoryOrderStore::new();
    let order = store.create_order(new_order(vec![])).await.unwrap();
    for _ in 0..2 {
      store
        .record_payment_attempt(NewPaymentAttempt {
          order_id: order.id,
          amount: order.total,
          mode: crate::models::PaymentMode::Hosted,
          installments: 1,
        })
        .await
        .unwrap();
    }
    let settled = store
      .settle_payment_attempt(
        order.id,
        AttemptSettlement {
          status: AttemptStatus::Failed,
          gateway_transaction_id: None,
          raw_response: None,
          failure_reason: Some("declined".into()),
        },
      )
      .await
      .unwrap()
      .unwrap();
    let attempts = store.payment_attempts(order.id).await.unwrap();
    assert_eq!(attempts[1].id, settled.id);
    assert_eq!(attempts[1].status, AttemptStatus::Failed);
    assert_eq!(attempts[0].status, AttemptStatus::Pending);
  }

  #[tokio::test]
  async fn delivery_log_drops_oldest_past_capacity() {
    let store = MemoryOrderStore::new();
    for n in 0..=MAX_DELIVERIES {
      store
        .record_webhook_delivery(NewWebhookDelivery {
          source: "shipping".into(),
          event_type: Some(format!("EVENT_{}", n)),
          shipment_id: None,
          order_number: None,
          outcome: crate::models::DeliveryOutcome::Ignored,
          message: String::new(),
          payload: None,
        })
        .await
        .unwrap();
    }
    let all = store.webhook_deliveries(MAX_DELIVERIES + 10).await.unwrap();
    assert_eq!(all.len(), MAX_DELIVERIES);
    assert_eq!(all[0].event_type.as_deref(), Some(format!("EVENT_{}", MAX_DELIVERIES).as_str()));
    assert_eq!(all.last().unwrap().event_type.as_deref(), Some("EVENT_1"));
  }
}
