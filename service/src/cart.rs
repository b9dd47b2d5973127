// service/src/cart.rs

//! Cart-clear collaborator used after a successful payment.

use crate::lifecycle::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait CartStore: Send + Sync {
  /// Empties the user's cart, returning how many lines were removed.
  async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgCartStore {
  pool: PgPool,
}

impl PgCartStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl CartStore for PgCartStore {
  async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected())
  }
}

#[derive(Default)]
pub struct MemoryCartStore {
  carts: Mutex<HashMap<Uuid, Vec<(Uuid, i32)>>>,
  clears: Mutex<Vec<Uuid>>,
}

impl MemoryCartStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
    self.carts.lock().entry(user_id).or_default().push((product_id, quantity));
  }

  pub fn line_count(&self, user_id: Uuid) -> usize {
    self.carts.lock().get(&user_id).map(Vec::len).unwrap_or(0)
  }

  /// Users whose cart was cleared, once per call.
  pub fn clear_calls(&self) -> Vec<Uuid> {
    self.clears.lock().clone()
  }
}

#[async_trait]
impl CartStore for MemoryCartStore {
  async fn clear_cart(&self, user_id: Uuid) -> Result<u64, StoreError> {
    self.clears.lock().push(user_id);
    let removed = self.carts.lock().remove(&user_id).map(|lines| lines.len()).unwrap_or(0);
    Ok(removed as u64)
  }
}
