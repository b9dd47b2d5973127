// service/src/services/shipment_service.rs

//! Two-phase carrier booking for paid orders, plus cancellation, returns and
//! sender registration.

use crate::activity::{ActivityLog, ActivityRecord};
use crate::config::{ConfigError, ShippingGatewayConfig};
use crate::errors::AppError;
use crate::gateways::shipping::{ParcelDims, ReturnRequest, SenderProfile, ShipmentRequest, ShippingGateway};
use crate::gateways::GatewayError;
use crate::lifecycle::{OrderChange, OrderStore};
use crate::models::{Order, OrderKey, PaymentStatus, ShipmentInfo};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct ShipmentService {
  orders: Arc<dyn OrderStore>,
  shipping: Arc<dyn ShippingGateway>,
  activity: ActivityLog,
  config: ShippingGatewayConfig,
}

impl ShipmentService {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    shipping: Arc<dyn ShippingGateway>,
    activity: ActivityLog,
    config: ShippingGatewayConfig,
  ) -> Self {
    Self {
      orders,
      shipping,
      activity,
      config,
    }
  }

  async fn load(&self, key: &OrderKey) -> Result<Order, AppError> {
    self
      .orders
      .find_order(key)
      .await?
      .ok_or_else(|| AppError::OrderNotFound(key.to_string()))
  }

  /// Books a shipment for a paid order and stores the label data on it.
  ///
  /// Safe to call again: an order that already has an accepted offer is
  /// returned as is, and a shipment created by an earlier, interrupted call is
  /// reused instead of creating a second one.
  #[instrument(name = "shipment_service::create_for_order", skip(self), fields(order = %key))]
  pub async fn create_for_order(&self, key: &OrderKey) -> Result<Order, AppError> {
    let order = self.load(key).await?;
    if order.payment_status != PaymentStatus::Paid {
      return Err(AppError::Conflict(format!(
        "order {} is not paid ({})",
        order.order_number, order.payment_status
      )));
    }
    if order.order_status.is_terminal() {
      return Err(AppError::Conflict(format!(
        "order {} is already {}",
        order.order_number, order.order_status
      )));
    }
    if order.shipment.transaction_id.is_some() {
      info!(order_number = %order.order_number, "Shipment already booked.");
      return Ok(order);
    }

    let shipment_id = match order.shipment.shipment_id.clone() {
      Some(existing) => existing,
      None => {
        let sender_id = self
          .config
          .sender_id
          .clone()
          .ok_or_else(|| ConfigError::Missing("SHIPPING_SENDER_ID".to_string()))?;
        let request = ShipmentRequest {
          sender_id,
          recipient: order.shipping_address.clone(),
          parcel: ParcelDims::default(),
          order_ref: order.order_number.clone(),
          amount: order.total,
          test: self.config.test_mode,
        };
        let shipment_id = self.shipping.create_shipment(&request).await?;
        // Persist before the offer phase so a retry can pick it up.
        self
          .orders
          .apply_change(
            order.id,
            OrderChange::shipment(ShipmentInfo {
              shipment_id: Some(shipment_id.clone()),
              ..Default::default()
            }),
          )
          .await?;
        shipment_id
      }
    };

    let offers = self.shipping.get_offers(&shipment_id).await?;
    let cheapest = offers
      .into_iter()
      .min_by(|a, b| a.amount.cmp(&b.amount))
      .ok_or_else(|| GatewayError::Rejected {
        code: "NO_OFFERS".to_string(),
        message: format!("no carrier offers for shipment {}", shipment_id),
      })?;

    let accepted = self.shipping.accept_offer(&cheapest.id).await?;
    let patch = ShipmentInfo {
      shipment_id: Some(shipment_id.clone()),
      transaction_id: Some(accepted.transaction_id.clone()),
      tracking_number: accepted.tracking_number.clone(),
      tracking_url: accepted.tracking_url.clone(),
      label_url: accepted.label_url.clone(),
      label_pdf_url: accepted.label_pdf_url.clone(),
      carrier: accepted.carrier.clone().or(Some(cheapest.carrier.clone())),
      tracking_status: None,
    };
    let outcome = self.orders.apply_change(order.id, OrderChange::shipment(patch)).await?;

    info!(
      order_number = %order.order_number,
      %shipment_id,
      carrier = %cheapest.carrier,
      amount = %cheapest.amount,
      test = self.config.test_mode,
      "Shipment booked."
    );
    self.activity.record(
      ActivityRecord::new(
        "system",
        "shipment_created",
        format!("Shipment booked for order {}", order.order_number),
      )
      .with_metadata(json!({
        "orderNumber": order.order_number,
        "shipmentId": shipment_id,
        "carrier": cheapest.carrier,
        "offerAmount": cheapest.amount,
        "test": self.config.test_mode,
      })),
    );
    Ok(outcome.order)
  }

  #[instrument(name = "shipment_service::cancel", skip(self), fields(order = %key))]
  pub async fn cancel(&self, key: &OrderKey) -> Result<Order, AppError> {
    let order = self.load(key).await?;
    let shipment_id = order
      .shipment
      .shipment_id
      .clone()
      .ok_or_else(|| AppError::Conflict(format!("order {} has no shipment", order.order_number)))?;
    if order.order_status.is_terminal() {
      return Err(AppError::Conflict(format!(
        "order {} is already {}",
        order.order_number, order.order_status
      )));
    }

    self.shipping.cancel(&shipment_id).await?;
    let outcome = self
      .orders
      .apply_change(
        order.id,
        OrderChange::shipment(ShipmentInfo {
          tracking_status: Some("CANCELLED".to_string()),
          ..Default::default()
        }),
      )
      .await?;
    self.activity.record(
      ActivityRecord::new(
        "system",
        "shipment_cancelled",
        format!("Shipment {} cancelled for order {}", shipment_id, order.order_number),
      )
      .with_metadata(json!({ "orderNumber": order.order_number, "shipmentId": shipment_id })),
    );
    Ok(outcome.order)
  }

  /// Opens a return shipment and returns its id. The order itself moves only
  /// when the carrier reports `RETURNED`.
  #[instrument(name = "shipment_service::create_return", skip(self, request), fields(order = %key))]
  pub async fn create_return(&self, key: &OrderKey, request: &ReturnRequest) -> Result<String, AppError> {
    let order = self.load(key).await?;
    let shipment_id = order
      .shipment
      .shipment_id
      .clone()
      .ok_or_else(|| AppError::Conflict(format!("order {} has no shipment", order.order_number)))?;

    let return_id = self.shipping.create_return(&shipment_id, request).await?;
    self.activity.record(
      ActivityRecord::new(
        "system",
        "shipment_return_created",
        format!("Return {} opened for order {}", return_id, order.order_number),
      )
      .with_metadata(json!({
        "orderNumber": order.order_number,
        "shipmentId": shipment_id,
        "returnId": return_id,
        "reason": request.reason,
      })),
    );
    Ok(return_id)
  }

  /// One-time sender registration. Failures are returned to the caller.
  #[instrument(name = "shipment_service::register_sender", skip(self, profile))]
  pub async fn register_sender(&self, profile: &SenderProfile) -> Result<String, AppError> {
    match self.shipping.create_sender(profile).await {
      Ok(sender_id) => {
        info!(%sender_id, "Sender registered; set SHIPPING_SENDER_ID to use it.");
        self.activity.record(
          ActivityRecord::new("system", "shipping_sender_registered", format!("Sender {} registered", sender_id))
            .with_metadata(json!({ "senderId": sender_id, "name": profile.name })),
        );
        Ok(sender_id)
      }
      Err(e) => {
        warn!(error = %e, "Sender registration failed.");
        Err(e.into())
      }
    }
  }
}
