// service/src/state.rs

use crate::activity::ActivityLog;
use crate::cart::CartStore;
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::gateways::payment::PaymentGateway;
use crate::gateways::shipping::ShippingGateway;
use crate::lifecycle::OrderStore;
use crate::reconciliation::Reconciler;
use crate::services::ShipmentService;
use parcelpay_flow::Registry;
use std::sync::Arc;

/// Everything a handler or pipeline step needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub orders: Arc<dyn OrderStore>,
  pub carts: Arc<dyn CartStore>,
  pub payments: Arc<dyn PaymentGateway>,
  pub shipping: Arc<dyn ShippingGateway>,
  pub activity: ActivityLog,
  pub flows: Arc<Registry<AppError>>,
  pub shipments: Arc<ShipmentService>,
  pub reconciler: Arc<Reconciler>,
}

impl AppState {
  /// Wires the collaborators together. Pipelines still have to be registered
  /// with [`crate::pipelines::register_all_pipelines`].
  pub fn new(
    config: Arc<AppConfig>,
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    payments: Arc<dyn PaymentGateway>,
    shipping: Arc<dyn ShippingGateway>,
    activity: ActivityLog,
  ) -> Self {
    let shipments = Arc::new(ShipmentService::new(
      orders.clone(),
      shipping.clone(),
      activity.clone(),
      config.shipping.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
      orders.clone(),
      shipping.clone(),
      activity.clone(),
      config.reconcile.call_delay,
      config.reconcile.call_timeout,
    ));
    Self {
      config,
      orders,
      carts,
      payments,
      shipping,
      activity,
      flows: Arc::new(Registry::new()),
      shipments,
      reconciler,
    }
  }

  /// `new` plus pipeline registration.
  pub fn build(
    config: Arc<AppConfig>,
    orders: Arc<dyn OrderStore>,
    carts: Arc<dyn CartStore>,
    payments: Arc<dyn PaymentGateway>,
    shipping: Arc<dyn ShippingGateway>,
    activity: ActivityLog,
  ) -> Self {
    let state = Self::new(config, orders, carts, payments, shipping, activity);
    crate::pipelines::register_all_pipelines(&state.flows);
    state
  }
}
