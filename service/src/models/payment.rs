// service/src/models/payment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type as SqlxType;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_attempt_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
  Pending,
  Paid,
  Failed,
}

/// How the card data reaches the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
  /// Synchronous capture, no redirect.
  Direct,
  /// Step-up authentication page served by the card issuer.
  ThreeD,
  /// Card form hosted by the provider.
  Hosted,
}

impl PaymentMode {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentMode::Direct => "direct",
      PaymentMode::ThreeD => "three_d",
      PaymentMode::Hosted => "hosted",
    }
  }
}

/// One gateway attempt for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
  pub id: Uuid,
  pub order_id: Uuid,
  pub amount: Decimal,
  pub mode: PaymentMode,
  pub installments: u32,
  pub status: AttemptStatus,
  pub gateway_transaction_id: Option<String>,
  pub raw_response: Option<serde_json::Value>,
  pub failure_reason: Option<String>,
  pub created_at: DateTime<Utc>,
  pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentAttempt {
  pub order_id: Uuid,
  pub amount: Decimal,
  pub mode: PaymentMode,
  pub installments: u32,
}

#[derive(Debug, Clone)]
pub struct AttemptSettlement {
  pub status: AttemptStatus,
  pub gateway_transaction_id: Option<String>,
  pub raw_response: Option<serde_json::Value>,
  pub failure_reason: Option<String>,
}
