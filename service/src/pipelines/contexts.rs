// service/src/pipelines/contexts.rs

//! Context data for every pipeline. Handlers receive these wrapped in
//! `parcelpay_flow::ContextData`.

use crate::gateways::payment::CardData;
use crate::gateways::shipping::CarrierStatus;
use crate::lifecycle::StockOutcome;
use crate::models::{DeliveryOutcome, Order, PaymentAttempt, PaymentMode, ShipmentInfo};
use crate::state::AppState;
use actix_web::web::Bytes;

// --- Payment callback ---

/// Values pulled out of a callback, whatever dialect it used.
#[derive(Debug, Clone)]
pub struct CallbackPayload {
  pub order_ref: String,
  pub result_code: String,
  pub success: bool,
  pub message: Option<String>,
  pub transaction_id: Option<String>,
  pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
  Undecided,
  Paid,
  /// Order was already paid; nothing was re-applied.
  Duplicate,
  Failed { message: String },
}

#[derive(Clone)]
pub struct PaymentCallbackCtx {
  pub app_state: AppState,
  /// Body fields first, then query-string fields.
  pub fields: Vec<(String, String)>,
  pub payload: Option<CallbackPayload>,
  pub order: Option<Order>,
  pub outcome: CallbackOutcome,
  pub newly_paid: bool,
  pub stock: Option<StockOutcome>,
}

impl PaymentCallbackCtx {
  pub fn new(app_state: AppState, fields: Vec<(String, String)>) -> Self {
    Self {
      app_state,
      fields,
      payload: None,
      order: None,
      outcome: CallbackOutcome::Undecided,
      newly_paid: false,
      stock: None,
    }
  }
}

// --- Checkout (payment initiation) ---

#[derive(Clone)]
pub struct CheckoutCtx {
  pub app_state: AppState,
  pub order_number: String,
  pub mode: PaymentMode,
  pub installments: u32,
  pub card: Option<CardData>,
  pub customer_phone: Option<String>,
  pub order: Option<Order>,
  pub attempt: Option<PaymentAttempt>,
  pub transaction_id: Option<String>,
  pub gateway_raw: Option<serde_json::Value>,
  pub redirect_url: Option<String>,
  pub stock: Option<StockOutcome>,
}

impl CheckoutCtx {
  pub fn new(
    app_state: AppState,
    order_number: String,
    mode: PaymentMode,
    installments: u32,
    card: Option<CardData>,
    customer_phone: Option<String>,
  ) -> Self {
    Self {
      app_state,
      order_number,
      mode,
      installments,
      card,
      customer_phone,
      order: None,
      attempt: None,
      transaction_id: None,
      gateway_raw: None,
      redirect_url: None,
      stock: None,
    }
  }
}

// --- Shipping webhook ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingEventKind {
  ShipmentCreated,
  TrackUpdated,
  LabelReady,
  Unknown(String),
}

impl ShippingEventKind {
  pub fn parse(event: &str) -> Self {
    match event.trim().to_ascii_uppercase().as_str() {
      "SHIPMENT_CREATED" => ShippingEventKind::ShipmentCreated,
      "TRACK_UPDATED" => ShippingEventKind::TrackUpdated,
      "LABEL_READY" => ShippingEventKind::LabelReady,
      other => ShippingEventKind::Unknown(other.to_string()),
    }
  }
}

/// A parsed event: identifiers plus whatever shipment fields it carried.
#[derive(Debug, Clone)]
pub struct ShippingEvent {
  pub kind: ShippingEventKind,
  pub event_type: String,
  pub shipment_id: Option<String>,
  pub order_number: Option<String>,
  pub status: Option<CarrierStatus>,
  pub patch: ShipmentInfo,
}

#[derive(Clone)]
pub struct ShippingWebhookCtx {
  pub app_state: AppState,
  pub raw_body: Bytes,
  pub signature: Option<String>,
  pub event: Option<ShippingEvent>,
  pub payload: Option<serde_json::Value>,
  pub order: Option<Order>,
  pub outcome: DeliveryOutcome,
  pub message: String,
}

impl ShippingWebhookCtx {
  pub fn new(app_state: AppState, raw_body: Bytes, signature: Option<String>) -> Self {
    Self {
      app_state,
      raw_body,
      signature,
      event: None,
      payload: None,
      order: None,
      outcome: DeliveryOutcome::Failed,
      message: String::new(),
    }
  }
}
