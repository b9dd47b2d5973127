// service/src/models/mod.rs

//! Order aggregate and the records kept alongside it.

pub mod order;
pub mod order_item;
pub mod payment;
pub mod webhook_delivery;

pub use order::{AddressSnapshot, NewOrder, Order, OrderKey, OrderStatus, PaymentMethod, PaymentStatus, ShipmentInfo};
pub use order_item::{NewOrderItem, OrderItem};
pub use payment::{AttemptSettlement, AttemptStatus, NewPaymentAttempt, PaymentAttempt, PaymentMode};
pub use webhook_delivery::{DeliveryOutcome, NewWebhookDelivery, WebhookDelivery};
