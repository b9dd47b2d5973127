// service/src/reconciliation/mod.rs

//! Pull-based shipment reconciliation.
//!
//! A pass walks every open order that carries a shipment id, asks the carrier
//! for its tracking state and applies it through the same mapping the webhook
//! uses. Each order is its own unit of work: a timeout or gateway error is
//! counted and the pass moves on.

pub mod scheduler;

pub use scheduler::ReconciliationScheduler;

use crate::activity::{ActivityLog, ActivityRecord};
use crate::errors::AppError;
use crate::gateways::shipping::ShippingGateway;
use crate::gateways::GatewayError;
use crate::lifecycle::{OrderStore, StoreError};
use crate::models::{Order, OrderStatus, ShipmentInfo};
use crate::services::tracking::{apply_tracking_update, TrackingUpdate};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("a reconciliation pass is already running")]
  AlreadyRunning,

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl From<ReconcileError> for AppError {
  fn from(err: ReconcileError) -> Self {
    match err {
      ReconcileError::AlreadyRunning => AppError::Conflict(err.to_string()),
      ReconcileError::Store(e) => AppError::Store(e),
    }
  }
}

#[derive(Debug, Error)]
enum ItemError {
  #[error("tracking call timed out after {0:?}")]
  Timeout(Duration),

  #[error(transparent)]
  Gateway(#[from] GatewayError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledOrder {
  pub order_number: String,
  pub shipment_id: String,
  pub carrier_status: String,
  pub previous_status: OrderStatus,
  pub new_status: OrderStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
  pub checked: usize,
  pub updated: usize,
  pub errors: usize,
  pub duration_ms: u64,
  pub updates: Vec<ReconciledOrder>,
}

pub struct Reconciler {
  orders: Arc<dyn OrderStore>,
  shipping: Arc<dyn ShippingGateway>,
  activity: ActivityLog,
  call_delay: Duration,
  call_timeout: Duration,
  running: Mutex<()>,
}

impl Reconciler {
  pub fn new(
    orders: Arc<dyn OrderStore>,
    shipping: Arc<dyn ShippingGateway>,
    activity: ActivityLog,
    call_delay: Duration,
    call_timeout: Duration,
  ) -> Self {
    Self {
      orders,
      shipping,
      activity,
      call_delay,
      call_timeout,
      running: Mutex::new(()),
    }
  }

  pub fn is_running(&self) -> bool {
    self.running.try_lock().is_err()
  }

  /// Runs one pass. Fails with `AlreadyRunning` instead of waiting when
  /// another pass holds the lock.
  #[instrument(name = "reconciler::run_pass", skip(self))]
  pub async fn run_pass(&self) -> Result<ReconciliationReport, ReconcileError> {
    let _guard = self.running.try_lock().map_err(|_| ReconcileError::AlreadyRunning)?;
    let started = Instant::now();

    let orders = self.orders.open_shipment_orders().await?;
    let mut report = ReconciliationReport::default();

    for order in &orders {
      let Some(shipment_id) = order.shipment.shipment_id.clone() else {
        continue;
      };
      if report.checked > 0 && !self.call_delay.is_zero() {
        tokio::time::sleep(self.call_delay).await;
      }
      report.checked += 1;

      match self.reconcile_one(order, &shipment_id).await {
        Ok(Some(update)) => {
          report.updated += 1;
          report.updates.push(update);
        }
        Ok(None) => debug!(order_number = %order.order_number, "Order already in sync."),
        Err(e) => {
          report.errors += 1;
          warn!(order_number = %order.order_number, %shipment_id, error = %e, "Reconciliation failed for order.");
        }
      }
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
      checked = report.checked,
      updated = report.updated,
      errors = report.errors,
      duration_ms = report.duration_ms,
      "Reconciliation pass finished."
    );
    self.activity.record(
      ActivityRecord::new(
        "system",
        "shipping_reconciliation",
        format!(
          "Checked {} shipments, updated {}, {} errors",
          report.checked, report.updated, report.errors
        ),
      )
      .with_metadata(json!({
        "checked": report.checked,
        "updated": report.updated,
        "errors": report.errors,
        "durationMs": report.duration_ms,
      })),
    );
    Ok(report)
  }

  async fn reconcile_one(&self, order: &Order, shipment_id: &str) -> Result<Option<ReconciledOrder>, ItemError> {
    let tracking = tokio::time::timeout(self.call_timeout, self.shipping.get_tracking(shipment_id))
      .await
      .map_err(|_| ItemError::Timeout(self.call_timeout))??;

    let update = TrackingUpdate {
      status: Some(tracking.status.clone()),
      patch: ShipmentInfo {
        tracking_number: tracking.tracking_number,
        tracking_url: tracking.tracking_url,
        label_url: tracking.label_url,
        ..Default::default()
      },
    };
    let applied = apply_tracking_update(self.orders.as_ref(), order, update).await?;
    if !applied.changed() {
      return Ok(None);
    }
    Ok(Some(ReconciledOrder {
      order_number: order.order_number.clone(),
      shipment_id: shipment_id.to_string(),
      carrier_status: tracking.status.code().to_string(),
      previous_status: applied.previous_status,
      new_status: applied.order.order_status,
    }))
  }
}
