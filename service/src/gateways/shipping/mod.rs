// service/src/gateways/shipping/mod.rs

//! Cargo broker adapter: sender registration, two-phase shipment creation
//! (offers, then acceptance), tracking, cancellation and returns.

pub mod client;

pub use client::ShippingApiClient;

use crate::gateways::GatewayError;
use crate::models::AddressSnapshot;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Carrier-side shipment status, as reported by tracking and webhooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierStatus {
  PickedUp,
  InTransit,
  Delivered,
  Returned,
  Other(String),
}

impl CarrierStatus {
  pub fn parse(code: &str) -> Self {
    let normalized = code.trim().to_ascii_uppercase().replace([' ', '-'], "_");
    match normalized.as_str() {
      "PICKED_UP" | "PICKEDUP" => CarrierStatus::PickedUp,
      "IN_TRANSIT" | "INTRANSIT" | "OUT_FOR_DELIVERY" => CarrierStatus::InTransit,
      "DELIVERED" => CarrierStatus::Delivered,
      "RETURNED" | "RETURN_TO_SENDER" => CarrierStatus::Returned,
      _ => CarrierStatus::Other(normalized),
    }
  }

  pub fn code(&self) -> &str {
    match self {
      CarrierStatus::PickedUp => "PICKED_UP",
      CarrierStatus::InTransit => "IN_TRANSIT",
      CarrierStatus::Delivered => "DELIVERED",
      CarrierStatus::Returned => "RETURNED",
      CarrierStatus::Other(code) => code,
    }
  }
}

impl fmt::Display for CarrierStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
  pub name: String,
  pub email: String,
  pub phone: String,
  pub address: String,
  pub city: String,
  pub district: String,
  pub zip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelDims {
  pub length: Decimal,
  pub width: Decimal,
  pub height: Decimal,
  /// Centimetres.
  pub distance_unit: String,
  pub weight: Decimal,
  /// Kilograms.
  pub mass_unit: String,
}

impl Default for ParcelDims {
  fn default() -> Self {
    Self {
      length: Decimal::new(30, 0),
      width: Decimal::new(20, 0),
      height: Decimal::new(10, 0),
      distance_unit: "cm".to_string(),
      weight: Decimal::new(1, 0),
      mass_unit: "kg".to_string(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct ShipmentRequest {
  pub sender_id: String,
  pub recipient: AddressSnapshot,
  pub parcel: ParcelDims,
  pub order_ref: String,
  pub amount: Decimal,
  /// Always set explicitly from configuration.
  pub test: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
  pub id: String,
  pub carrier: String,
  pub service_code: Option<String>,
  pub amount: Decimal,
  pub currency: String,
}

/// Result of accepting an offer; the label exists from here on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedOffer {
  pub transaction_id: String,
  pub tracking_number: Option<String>,
  pub tracking_url: Option<String>,
  pub label_url: Option<String>,
  pub label_pdf_url: Option<String>,
  pub carrier: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingStatus {
  pub shipment_id: String,
  pub status: CarrierStatus,
  pub tracking_number: Option<String>,
  pub tracking_url: Option<String>,
  pub label_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
  pub reason: Option<String>,
  pub service_code: Option<String>,
}

/// Every method reports transport failures as `GatewayError::Unreachable`
/// so batch callers can move on to the next item.
#[async_trait]
pub trait ShippingGateway: Send + Sync {
  /// One-time registration. Errors are returned as-is and never retried.
  async fn create_sender(&self, profile: &SenderProfile) -> Result<String, GatewayError>;

  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<String, GatewayError>;

  async fn get_offers(&self, shipment_id: &str) -> Result<Vec<Offer>, GatewayError>;

  async fn accept_offer(&self, offer_id: &str) -> Result<AcceptedOffer, GatewayError>;

  async fn get_tracking(&self, shipment_id: &str) -> Result<TrackingStatus, GatewayError>;

  async fn cancel(&self, shipment_id: &str) -> Result<(), GatewayError>;

  /// Opens a return shipment and returns its id.
  async fn create_return(&self, shipment_id: &str, request: &ReturnRequest) -> Result<String, GatewayError>;
}
