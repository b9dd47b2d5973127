// service/src/web/handlers/mod.rs

pub mod payment_handlers;
pub mod reconcile_handlers;
pub mod shipping_handlers;
pub mod webhook_handlers;
