// service/src/pipelines/shipping_webhook_pipeline.rs

//! Signed push events from the cargo broker.
//!
//! The signature is checked over the raw body before anything is parsed.
//! Unknown event types and events for unknown shipments stop the run with an
//! acknowledged outcome; they are not errors.

use crate::errors::AppError;
use crate::gateways::shipping::CarrierStatus;
use crate::lifecycle::{find_by_reference, OrderStore, StoreError};
use crate::models::{DeliveryOutcome, Order, ShipmentInfo};
use crate::pipelines::contexts::{ShippingEvent, ShippingEventKind, ShippingWebhookCtx};
use crate::services::tracking::{apply_tracking_update, TrackingUpdate};
use crate::services::webhook_signature;
use parcelpay_flow::{ContextData, Pipeline, PipelineControl, Registry};
use serde_json::Value;
use tracing::{info, instrument, warn};

pub fn register_shipping_webhook_pipeline(registry: &Registry<AppError>) {
  let mut p = Pipeline::<ShippingWebhookCtx, AppError>::new(&[
    ("verify_signature", false, None),
    ("parse_event", false, None),
    ("locate_order", false, None),
    ("apply_event", false, None),
  ])
  .named("shipping_webhook");

  p.on("verify_signature", verify_signature);
  p.on("parse_event", parse_event);
  p.on("locate_order", locate_order);
  p.on("apply_event", apply_event);

  registry.register_pipeline(p);
}

#[instrument(name = "shipping_webhook::verify_signature", skip_all)]
async fn verify_signature(ctx: ContextData<ShippingWebhookCtx>) -> Result<PipelineControl, AppError> {
  let (webhook, body, signature) = ctx.with(|c| {
    (
      c.app_state.config.webhook.clone(),
      c.raw_body.clone(),
      c.signature.clone(),
    )
  });

  if webhook.skip_signature {
    warn!("Webhook signature check bypassed by configuration.");
    return Ok(PipelineControl::Continue);
  }
  let secret = webhook
    .secret
    .as_deref()
    .ok_or_else(|| AppError::SignatureInvalid("no webhook secret configured".to_string()))?;
  let signature = signature
    .ok_or_else(|| AppError::SignatureInvalid(format!("missing '{}' header", webhook.signature_header)))?;
  if !webhook_signature::verify(secret, &body, &signature) {
    return Err(AppError::SignatureInvalid("signature mismatch".to_string()));
  }
  Ok(PipelineControl::Continue)
}

/// First value among `names` in `data`, as text. Numbers are accepted.
fn text(data: &Value, names: &[&str]) -> Option<String> {
  names.iter().find_map(|name| match data.get(*name) {
    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

/// Reads `{event, data}` into a [`ShippingEvent`]. Absent fields stay `None`.
pub fn parse_shipping_event(body: &[u8]) -> Result<(ShippingEvent, Value), AppError> {
  let payload: Value =
    serde_json::from_slice(body).map_err(|e| AppError::MalformedPayload(format!("invalid JSON: {}", e)))?;
  let event_type = text(&payload, &["event", "eventType", "type"])
    .ok_or_else(|| AppError::MalformedPayload("missing event type".to_string()))?;
  let data = payload.get("data").cloned().unwrap_or(Value::Null);
  if !data.is_object() {
    return Err(AppError::MalformedPayload("missing data object".to_string()));
  }

  let shipment_id = text(&data, &["shipmentId", "shipment_id", "id"]);
  let patch = ShipmentInfo {
    shipment_id: shipment_id.clone(),
    transaction_id: text(&data, &["transactionId", "transaction_id"]),
    tracking_number: text(&data, &["trackingNumber", "tracking_number"]),
    tracking_url: text(&data, &["trackingUrl", "tracking_url"]),
    label_url: text(&data, &["labelUrl", "label_url"]),
    label_pdf_url: text(&data, &["labelPdfUrl", "labelPDFUrl", "label_pdf_url"]),
    carrier: text(&data, &["carrier", "providerName", "provider"]),
    tracking_status: None,
  };
  let event = ShippingEvent {
    kind: ShippingEventKind::parse(&event_type),
    event_type,
    shipment_id,
    order_number: text(&data, &["orderNumber", "order_number", "reference", "orderRef"]),
    status: text(&data, &["statusCode", "status_code", "status"]).map(|s| CarrierStatus::parse(&s)),
    patch,
  };
  Ok((event, payload))
}

async fn parse_event(ctx: ContextData<ShippingWebhookCtx>) -> Result<PipelineControl, AppError> {
  let body = ctx.with(|c| c.raw_body.clone());
  let (event, payload) = parse_shipping_event(&body)?;
  info!(
    event_type = %event.event_type,
    shipment_id = ?event.shipment_id,
    order_number = ?event.order_number,
    "Shipping webhook received."
  );

  let unknown = matches!(event.kind, ShippingEventKind::Unknown(_));
  ctx.update(|c| {
    if unknown {
      c.outcome = DeliveryOutcome::Ignored;
      c.message = format!("Event '{}' acknowledged but not handled", event.event_type);
    }
    c.event = Some(event);
    c.payload = Some(payload);
  });
  Ok(if unknown {
    PipelineControl::Stop
  } else {
    PipelineControl::Continue
  })
}

async fn by_number(store: &dyn OrderStore, event: &ShippingEvent) -> Result<Option<Order>, StoreError> {
  match &event.order_number {
    Some(reference) => find_by_reference(store, reference).await,
    None => Ok(None),
  }
}

async fn by_shipment(store: &dyn OrderStore, event: &ShippingEvent) -> Result<Option<Order>, StoreError> {
  match &event.shipment_id {
    Some(id) => store.find_by_shipment_id(id).await,
    None => Ok(None),
  }
}

async fn lookup(store: &dyn OrderStore, event: &ShippingEvent) -> Result<Option<Order>, StoreError> {
  if event.kind != ShippingEventKind::ShipmentCreated {
    return by_shipment(store, event).await;
  }
  // Creation events may arrive before the shipment id is stored on the order.
  match by_number(store, event).await? {
    Some(order) => Ok(Some(order)),
    None => by_shipment(store, event).await,
  }
}

/// The shipment id the event names when the order is already linked to another one.
fn foreign_shipment<'a>(order: &Order, event: &'a ShippingEvent) -> Option<&'a str> {
  match (&order.shipment.shipment_id, &event.shipment_id) {
    (Some(linked), Some(incoming)) if linked != incoming => Some(incoming.as_str()),
    _ => None,
  }
}

async fn locate_order(ctx: ContextData<ShippingWebhookCtx>) -> Result<PipelineControl, AppError> {
  let (state, event) = ctx.with(|c| (c.app_state.clone(), c.event.clone()));
  let event = event.ok_or_else(|| AppError::Internal("event not parsed".to_string()))?;

  match lookup(state.orders.as_ref(), &event).await? {
    Some(order) => {
      ctx.update(|c| c.order = Some(order));
      Ok(PipelineControl::Continue)
    }
    None => {
      info!(
        event_type = %event.event_type,
        shipment_id = ?event.shipment_id,
        order_number = ?event.order_number,
        "No order matches shipping event."
      );
      ctx.update(|c| {
        c.outcome = DeliveryOutcome::NotFound;
        c.message = "No matching order".to_string();
      });
      Ok(PipelineControl::Stop)
    }
  }
}

async fn apply_event(ctx: ContextData<ShippingWebhookCtx>) -> Result<PipelineControl, AppError> {
  let (state, event, order) = ctx.with(|c| (c.app_state.clone(), c.event.clone(), c.order.clone()));
  let (Some(event), Some(order)) = (event, order) else {
    return Err(AppError::Internal("event or order missing".to_string()));
  };

  if let Some(incoming) = foreign_shipment(&order, &event) {
    warn!(
      order_number = %order.order_number,
      linked = ?order.shipment.shipment_id,
      incoming,
      "Shipping event names a different shipment than the order's."
    );
    ctx.update(|c| {
      c.outcome = DeliveryOutcome::Ignored;
      c.message = format!("Order is linked to another shipment, '{}' ignored", incoming);
    });
    return Ok(PipelineControl::Stop);
  }

  let status = match event.kind {
    ShippingEventKind::TrackUpdated => event.status.clone(),
    _ => None,
  };
  let applied = apply_tracking_update(
    state.orders.as_ref(),
    &order,
    TrackingUpdate {
      status,
      patch: event.patch.clone(),
    },
  )
  .await?;

  let (outcome, message) = if let Some(reason) = &applied.ignored_reason {
    (DeliveryOutcome::Ignored, format!("Status ignored: {}", reason))
  } else if applied.changed() {
    (
      DeliveryOutcome::Processed,
      format!("Order {} is {}", applied.order.order_number, applied.order.order_status),
    )
  } else {
    (DeliveryOutcome::Ignored, "No changes".to_string())
  };
  ctx.update(|c| {
    c.outcome = outcome;
    c.message = message;
    c.order = Some(applied.order);
  });
  Ok(PipelineControl::Continue)
}
