// service/src/pipelines/mod.rs

//! The flows that run on `parcelpay_flow`, one module per pipeline.

use crate::errors::AppError;
use parcelpay_flow::Registry;

pub mod contexts;

pub mod checkout_pipeline;
pub mod payment_callback_pipeline;
pub mod shipping_webhook_pipeline;

/// Registers every pipeline. Called once at startup.
pub fn register_all_pipelines(registry: &Registry<AppError>) {
  tracing::info!("Registering pipelines...");

  checkout_pipeline::register_checkout_pipeline(registry);
  payment_callback_pipeline::register_payment_callback_pipeline(registry);
  shipping_webhook_pipeline::register_shipping_webhook_pipeline(registry);

  tracing::info!("All pipelines registered.");
}
