// service/src/services/mod.rs

//! Domain operations shared by the pipelines, the HTTP handlers and the
//! reconciliation scheduler.

pub mod payment_outcome;
pub mod shipment_service;
pub mod tracking;
pub mod webhook_signature;

pub use shipment_service::ShipmentService;
pub use tracking::{apply_tracking_update, carrier_transition, TrackingApplied, TrackingUpdate};
