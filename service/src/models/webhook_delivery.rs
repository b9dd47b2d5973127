// service/src/models/webhook_delivery.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type as SqlxType;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "delivery_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
  /// Event applied to an order.
  Processed,
  /// Valid event that changed nothing (duplicate, backward status, unknown type).
  Ignored,
  /// No order matches the event.
  NotFound,
  /// Signature check failed.
  Rejected,
  /// Body could not be parsed.
  Malformed,
  /// Processing failed on our side.
  Failed,
}

impl DeliveryOutcome {
  pub fn is_success(self) -> bool {
    matches!(
      self,
      DeliveryOutcome::Processed | DeliveryOutcome::Ignored | DeliveryOutcome::NotFound
    )
  }
}

/// One inbound webhook as received, kept apart from order history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
  pub id: Uuid,
  pub source: String,
  pub event_type: Option<String>,
  pub shipment_id: Option<String>,
  pub order_number: Option<String>,
  pub outcome: DeliveryOutcome,
  pub is_success: bool,
  pub message: String,
  pub payload: Option<serde_json::Value>,
  pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookDelivery {
  pub source: String,
  pub event_type: Option<String>,
  pub shipment_id: Option<String>,
  pub order_number: Option<String>,
  pub outcome: DeliveryOutcome,
  pub message: String,
  pub payload: Option<serde_json::Value>,
}

impl WebhookDelivery {
  pub fn from_new(new: NewWebhookDelivery, received_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      source: new.source,
      event_type: new.event_type,
      shipment_id: new.shipment_id,
      order_number: new.order_number,
      is_success: new.outcome.is_success(),
      outcome: new.outcome,
      message: new.message,
      payload: new.payload,
      received_at,
    }
  }
}
