// service/src/models/order.rs

use crate::models::order_item::{NewOrderItem, OrderItem};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type as SqlxType;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Pending,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Delivered and cancelled orders never change again.
  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Processing => "PROCESSING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Delivered => "DELIVERED",
      OrderStatus::Cancelled => "CANCELLED",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "PENDING",
      PaymentStatus::Paid => "PAID",
      PaymentStatus::Failed => "FAILED",
      PaymentStatus::Refunded => "REFUNDED",
    }
  }
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
  Card,
  BankTransfer,
}

/// Address copied onto the order when it is placed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
  pub full_name: String,
  pub phone: String,
  pub email: Option<String>,
  pub line1: String,
  pub line2: Option<String>,
  pub district: String,
  pub city: String,
  pub postal_code: Option<String>,
  pub country_code: String,
}

/// Carrier correlation fields. Filled in incrementally, never cleared by an
/// update that does not carry a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentInfo {
  pub shipment_id: Option<String>,
  pub transaction_id: Option<String>,
  pub tracking_number: Option<String>,
  pub tracking_url: Option<String>,
  pub label_url: Option<String>,
  pub label_pdf_url: Option<String>,
  pub carrier: Option<String>,
  pub tracking_status: Option<String>,
}

impl ShipmentInfo {
  /// Copies every field `patch` carries, leaving the rest as they are.
  pub fn merge(&mut self, patch: &ShipmentInfo) -> bool {
    let mut changed = false;
    let pairs = [
      (&mut self.shipment_id, &patch.shipment_id),
      (&mut self.transaction_id, &patch.transaction_id),
      (&mut self.tracking_number, &patch.tracking_number),
      (&mut self.tracking_url, &patch.tracking_url),
      (&mut self.label_url, &patch.label_url),
      (&mut self.label_pdf_url, &patch.label_pdf_url),
      (&mut self.carrier, &patch.carrier),
      (&mut self.tracking_status, &patch.tracking_status),
    ];
    for (current, incoming) in pairs {
      if let Some(value) = incoming {
        if current.as_deref() != Some(value.as_str()) {
          *current = Some(value.clone());
          changed = true;
        }
      }
    }
    changed
  }

  pub fn is_empty(&self) -> bool {
    *self == ShipmentInfo::default()
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub user_id: Option<Uuid>,
  pub subtotal: Decimal,
  pub shipping_cost: Decimal,
  pub tax: Decimal,
  pub total: Decimal,
  pub payment_method: PaymentMethod,
  pub payment_status: PaymentStatus,
  pub order_status: OrderStatus,
  pub shipping_address: AddressSnapshot,
  pub billing_address: AddressSnapshot,
  pub items: Vec<OrderItem>,
  pub shipment: ShipmentInfo,
  pub payment_transaction_id: Option<String>,
  pub payment_payload: Option<serde_json::Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// Builds a fresh `(PENDING, PENDING)` order from `new`.
  pub fn from_new(new: NewOrder, order_number: String, now: DateTime<Utc>) -> Self {
    let id = Uuid::new_v4();
    let items = new
      .items
      .into_iter()
      .map(|item| OrderItem::snapshot(id, item))
      .collect();
    Self {
      id,
      order_number,
      user_id: new.user_id,
      subtotal: new.subtotal,
      shipping_cost: new.shipping_cost,
      tax: new.tax,
      total: new.total,
      payment_method: new.payment_method,
      payment_status: PaymentStatus::Pending,
      order_status: OrderStatus::Pending,
      shipping_address: new.shipping_address,
      billing_address: new.billing_address,
      items,
      shipment: ShipmentInfo::default(),
      payment_transaction_id: None,
      payment_payload: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn has_open_shipment(&self) -> bool {
    self.shipment.shipment_id.is_some() && !self.order_status.is_terminal()
  }
}

/// Input for order creation. Items and addresses are snapshotted as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
  pub user_id: Option<Uuid>,
  pub subtotal: Decimal,
  pub shipping_cost: Decimal,
  pub tax: Decimal,
  pub total: Decimal,
  pub payment_method: PaymentMethod,
  pub shipping_address: AddressSnapshot,
  pub billing_address: AddressSnapshot,
  pub items: Vec<NewOrderItem>,
}

/// The payment provider echoes back either of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
  Id(Uuid),
  Number(String),
}

impl OrderKey {
  /// A value that parses as a UUID is an id, anything else an order number.
  pub fn parse(reference: &str) -> Self {
    let trimmed = reference.trim();
    match Uuid::parse_str(trimmed) {
      Ok(id) => OrderKey::Id(id),
      Err(_) => OrderKey::Number(trimmed.to_string()),
    }
  }
}

impl fmt::Display for OrderKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OrderKey::Id(id) => write!(f, "{}", id),
      OrderKey::Number(n) => f.write_str(n),
    }
  }
}
