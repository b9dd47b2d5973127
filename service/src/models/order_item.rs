// service/src/models/order_item.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Line snapshot taken at order time. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub product_image: Option<String>,
  pub unit_price: Decimal,
  pub quantity: i32,
}

impl OrderItem {
  pub fn snapshot(order_id: Uuid, item: NewOrderItem) -> Self {
    Self {
      id: Uuid::new_v4(),
      order_id,
      product_id: item.product_id,
      product_name: item.product_name,
      product_image: item.product_image,
      unit_price: item.unit_price,
      quantity: item.quantity,
    }
  }

  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
  pub product_id: Uuid,
  pub product_name: String,
  pub product_image: Option<String>,
  pub unit_price: Decimal,
  pub quantity: i32,
}
