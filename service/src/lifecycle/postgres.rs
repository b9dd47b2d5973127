// service/src/lifecycle/postgres.rs

use crate::lifecycle::transitions::{ChangeOutcome, OrderChange, Transition};
use crate::lifecycle::{generate_order_number, plan_stock_decrement, OrderStore, PaymentCapture, PaymentFinalization, StockOutcome, StoreError};
use crate::models::{
  AddressSnapshot, AttemptSettlement, AttemptStatus, DeliveryOutcome, NewOrder, NewPaymentAttempt, NewWebhookDelivery,
  Order, OrderItem, OrderKey, OrderStatus, PaymentAttempt, PaymentMethod, PaymentMode, PaymentStatus, ShipmentInfo,
  WebhookDelivery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, order_number, user_id, subtotal, shipping_cost, tax, total, payment_method, \
   payment_status, order_status, shipping_address, billing_address, shipment_id, shipment_transaction_id, \
   tracking_number, tracking_url, label_url, label_pdf_url, carrier, tracking_status, payment_transaction_id, \
   payment_payload, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, order_id, amount, mode, installments, status, gateway_transaction_id, \
   raw_response, failure_reason, created_at, settled_at";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(FromRow)]
struct OrderRow {
  id: Uuid,
  order_number: String,
  user_id: Option<Uuid>,
  subtotal: Decimal,
  shipping_cost: Decimal,
  tax: Decimal,
  total: Decimal,
  payment_method: PaymentMethod,
  payment_status: PaymentStatus,
  order_status: OrderStatus,
  shipping_address: Json<AddressSnapshot>,
  billing_address: Json<AddressSnapshot>,
  shipment_id: Option<String>,
  shipment_transaction_id: Option<String>,
  tracking_number: Option<String>,
  tracking_url: Option<String>,
  label_url: Option<String>,
  label_pdf_url: Option<String>,
  carrier: Option<String>,
  tracking_status: Option<String>,
  payment_transaction_id: Option<String>,
  payment_payload: Option<serde_json::Value>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl OrderRow {
  fn into_order(self, items: Vec<OrderItem>) -> Order {
    Order {
      id: self.id,
      order_number: self.order_number,
      user_id: self.user_id,
      subtotal: self.subtotal,
      shipping_cost: self.shipping_cost,
      tax: self.tax,
      total: self.total,
      payment_method: self.payment_method,
      payment_status: self.payment_status,
      order_status: self.order_status,
      shipping_address: self.shipping_address.0,
      billing_address: self.billing_address.0,
      items,
      shipment: ShipmentInfo {
        shipment_id: self.shipment_id,
        transaction_id: self.shipment_transaction_id,
        tracking_number: self.tracking_number,
        tracking_url: self.tracking_url,
        label_url: self.label_url,
        label_pdf_url: self.label_pdf_url,
        carrier: self.carrier,
        tracking_status: self.tracking_status,
      },
      payment_transaction_id: self.payment_transaction_id,
      payment_payload: self.payment_payload,
      created_at: self.created_at,
      updated_at: self.updated_at,
    }
  }
}

#[derive(FromRow)]
struct ItemRow {
  id: Uuid,
  order_id: Uuid,
  product_id: Uuid,
  product_name: String,
  product_image: Option<String>,
  unit_price: Decimal,
  quantity: i32,
}

impl From<ItemRow> for OrderItem {
  fn from(row: ItemRow) -> Self {
    OrderItem {
      id: row.id,
      order_id: row.order_id,
      product_id: row.product_id,
      product_name: row.product_name,
      product_image: row.product_image,
      unit_price: row.unit_price,
      quantity: row.quantity,
    }
  }
}

#[derive(FromRow)]
struct AttemptRow {
  id: Uuid,
  order_id: Uuid,
  amount: Decimal,
  mode: PaymentMode,
  installments: i32,
  status: AttemptStatus,
  gateway_transaction_id: Option<String>,
  raw_response: Option<serde_json::Value>,
  failure_reason: Option<String>,
  created_at: DateTime<Utc>,
  settled_at: Option<DateTime<Utc>>,
}

impl From<AttemptRow> for PaymentAttempt {
  fn from(row: AttemptRow) -> Self {
    PaymentAttempt {
      id: row.id,
      order_id: row.order_id,
      amount: row.amount,
      mode: row.mode,
      installments: u32::try_from(row.installments).unwrap_or(1),
      status: row.status,
      gateway_transaction_id: row.gateway_transaction_id,
      raw_response: row.raw_response,
      failure_reason: row.failure_reason,
      created_at: row.created_at,
      settled_at: row.settled_at,
    }
  }
}

#[derive(FromRow)]
struct DeliveryRow {
  id: Uuid,
  source: String,
  event_type: Option<String>,
  shipment_id: Option<String>,
  order_number: Option<String>,
  outcome: DeliveryOutcome,
  is_success: bool,
  message: String,
  payload: Option<serde_json::Value>,
  received_at: DateTime<Utc>,
}

impl From<DeliveryRow> for WebhookDelivery {
  fn from(row: DeliveryRow) -> Self {
    WebhookDelivery {
      id: row.id,
      source: row.source,
      event_type: row.event_type,
      shipment_id: row.shipment_id,
      order_number: row.order_number,
      outcome: row.outcome,
      is_success: row.is_success,
      message: row.message,
      payload: row.payload,
      received_at: row.received_at,
    }
  }
}

/// Postgres-backed order store. Schema in `service/schema.sql`.
#[derive(Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  async fn items_for(conn: &mut PgConnection, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, sqlx::Error> {
    let rows: Vec<ItemRow> = sqlx::query_as(
      "SELECT id, order_id, product_id, product_name, product_image, unit_price, quantity
         FROM order_items WHERE order_id = ANY($1) ORDER BY created_at, id",
    )
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
      by_order.entry(row.order_id).or_default().push(row.into());
    }
    Ok(by_order)
  }

  async fn hydrate(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>, sqlx::Error> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut items = Self::items_for(conn, &ids).await?;
    Ok(
      rows
        .into_iter()
        .map(|row| {
          let lines = items.remove(&row.id).unwrap_or_default();
          row.into_order(lines)
        })
        .collect(),
    )
  }

  async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<Order, StoreError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS))
      .bind(order_id)
      .fetch_optional(&mut *conn)
      .await?;
    let row = row.ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
    let mut orders = Self::hydrate(conn, vec![row]).await?;
    orders.pop().ok_or_else(|| StoreError::NotFound(order_id.to_string()))
  }

  /// Writes back the fields transitions and shipment patches touch.
  async fn write_state(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
      "UPDATE orders SET
          payment_status = $2, order_status = $3, payment_transaction_id = $4, payment_payload = $5,
          shipment_id = $6, shipment_transaction_id = $7, tracking_number = $8, tracking_url = $9,
          label_url = $10, label_pdf_url = $11, carrier = $12, tracking_status = $13, updated_at = $14
        WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.payment_status)
    .bind(order.order_status)
    .bind(&order.payment_transaction_id)
    .bind(&order.payment_payload)
    .bind(&order.shipment.shipment_id)
    .bind(&order.shipment.transaction_id)
    .bind(&order.shipment.tracking_number)
    .bind(&order.shipment.tracking_url)
    .bind(&order.shipment.label_url)
    .bind(&order.shipment.label_pdf_url)
    .bind(&order.shipment.carrier)
    .bind(&order.shipment.tracking_status)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
  }

  /// Decrements stock for `items` inside the caller's transaction.
  async fn decrement_stock(conn: &mut PgConnection, items: &[OrderItem]) -> Result<Result<usize, String>, sqlx::Error> {
    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let rows: Vec<(Uuid, i64, bool)> =
      sqlx::query_as("SELECT id, stock::BIGINT, track_stock FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
        .bind(&product_ids)
        .fetch_all(&mut *conn)
        .await?;
    let inventory: HashMap<Uuid, (i64, bool)> = rows.into_iter().map(|(id, stock, track)| (id, (stock, track))).collect();

    let planned = match plan_stock_decrement(items, |id| inventory.get(&id).copied()) {
      Ok(planned) => planned,
      Err(reason) => return Ok(Err(reason)),
    };
    for (product_id, qty) in &planned {
      sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
        .bind(product_id)
        .bind(qty)
        .execute(&mut *conn)
        .await?;
    }
    Ok(Ok(planned.len()))
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  async fn create_order(&self, new: NewOrder) -> Result<Order, StoreError> {
    let mut last_err = None;
    for _ in 0..3 {
      let order = Order::from_new(new.clone(), generate_order_number(Utc::now()), Utc::now());
      let mut tx = self.pool.begin().await?;
      let inserted = sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, subtotal, shipping_cost, tax, total, payment_method,
            payment_status, order_status, shipping_address, billing_address, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)",
      )
      .bind(order.id)
      .bind(&order.order_number)
      .bind(order.user_id)
      .bind(order.subtotal)
      .bind(order.shipping_cost)
      .bind(order.tax)
      .bind(order.total)
      .bind(order.payment_method)
      .bind(order.payment_status)
      .bind(order.order_status)
      .bind(Json(&order.shipping_address))
      .bind(Json(&order.billing_address))
      .bind(order.created_at)
      .execute(&mut *tx)
      .await;

      match inserted {
        Ok(_) => {}
        Err(e) if e.as_database_error().and_then(|d| d.code()).as_deref() == Some(UNIQUE_VIOLATION) => {
          tracing::warn!(order_number = %order.order_number, "Order number collision, retrying.");
          last_err = Some(e);
          continue;
        }
        Err(e) => return Err(e.into()),
      }

      for item in &order.items {
        sqlx::query(
          "INSERT INTO order_items (id, order_id, product_id, product_name, product_image, unit_price, quantity)
           VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(&item.product_image)
        .bind(item.unit_price)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;
      }
      tx.commit().await?;
      tracing::debug!(order_number = %order.order_number, "Order created.");
      return Ok(order);
    }
    Err(StoreError::Database(last_err.unwrap_or(sqlx::Error::RowNotFound)))
  }

  async fn find_order(&self, key: &OrderKey) -> Result<Option<Order>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    let query = match key {
      OrderKey::Id(_) => format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS),
      OrderKey::Number(_) => format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS),
    };
    let row: Option<OrderRow> = match key {
      OrderKey::Id(id) => sqlx::query_as(&query).bind(id).fetch_optional(&mut *conn).await?,
      OrderKey::Number(n) => sqlx::query_as(&query).bind(n).fetch_optional(&mut *conn).await?,
    };
    match row {
      Some(row) => Ok(Self::hydrate(&mut conn, vec![row]).await?.pop()),
      None => Ok(None),
    }
  }

  async fn find_by_shipment_id(&self, shipment_id: &str) -> Result<Option<Order>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE shipment_id = $1", ORDER_COLUMNS))
      .bind(shipment_id)
      .fetch_optional(&mut *conn)
      .await?;
    match row {
      Some(row) => Ok(Self::hydrate(&mut conn, vec![row]).await?.pop()),
      None => Ok(None),
    }
  }

  async fn open_shipment_orders(&self) -> Result<Vec<Order>, StoreError> {
    let mut conn = self.pool.acquire().await?;
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders
        WHERE shipment_id IS NOT NULL AND order_status NOT IN ('DELIVERED', 'CANCELLED')
        ORDER BY created_at",
      ORDER_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(Self::hydrate(&mut conn, rows).await?)
  }

  async fn apply_change(&self, order_id: Uuid, change: OrderChange) -> Result<ChangeOutcome, StoreError> {
    let mut tx = self.pool.begin().await?;
    let mut order = Self::lock_order(&mut tx, order_id).await?;
    let outcome = order.apply(&change)?;
    if outcome.changed() {
      Self::write_state(&mut tx, &outcome.order).await?;
    }
    tx.commit().await?;
    Ok(outcome)
  }

  async fn finalize_payment(&self, order_id: Uuid, capture: PaymentCapture) -> Result<PaymentFinalization, StoreError> {
    let mut tx = self.pool.begin().await?;
    let mut order = Self::lock_order(&mut tx, order_id).await?;
    let transition = order.mark_paid(capture.transaction_id, capture.payload)?;
    if transition == Transition::Unchanged {
      tx.commit().await?;
      return Ok(PaymentFinalization {
        order,
        transition,
        stock: StockOutcome::NotAttempted,
      });
    }
    Self::write_state(&mut tx, &order).await?;

    // Stock runs in a savepoint so its failure never takes the PAID write with it.
    sqlx::query("SAVEPOINT stock_decrement").execute(&mut *tx).await?;
    let stock = match Self::decrement_stock(&mut tx, &order.items).await {
      Ok(Ok(lines)) => {
        sqlx::query("RELEASE SAVEPOINT stock_decrement").execute(&mut *tx).await?;
        StockOutcome::Decremented { lines }
      }
      Ok(Err(reason)) => {
        sqlx::query("ROLLBACK TO SAVEPOINT stock_decrement").execute(&mut *tx).await?;
        StockOutcome::Failed { reason }
      }
      Err(e) => {
        sqlx::query("ROLLBACK TO SAVEPOINT stock_decrement").execute(&mut *tx).await?;
        StockOutcome::Failed { reason: e.to_string() }
      }
    };
    tx.commit().await?;
    Ok(PaymentFinalization {
      order,
      transition,
      stock,
    })
  }

  async fn record_payment_attempt(&self, attempt: NewPaymentAttempt) -> Result<PaymentAttempt, StoreError> {
    let installments = i32::try_from(attempt.installments).unwrap_or(i32::MAX);
    let row: AttemptRow = sqlx::query_as(&format!(
      "INSERT INTO payment_attempts (id, order_id, amount, mode, installments, status, created_at)
       VALUES ($1, $2, $3, $4, $5, 'PENDING', now())
       RETURNING {}",
      ATTEMPT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(attempt.order_id)
    .bind(attempt.amount)
    .bind(attempt.mode)
    .bind(installments)
    .fetch_one(&self.pool)
    .await?;
    Ok(row.into())
  }

  async fn settle_payment_attempt(
    &self,
    order_id: Uuid,
    settlement: AttemptSettlement,
  ) -> Result<Option<PaymentAttempt>, StoreError> {
    let row: Option<AttemptRow> = sqlx::query_as(&format!(
      "UPDATE payment_attempts SET status = $2, gateway_transaction_id = $3, raw_response = $4,
          failure_reason = $5, settled_at = now()
        WHERE id = (
          SELECT id FROM payment_attempts
           WHERE order_id = $1 AND status = 'PENDING'
           ORDER BY created_at DESC LIMIT 1
           FOR UPDATE
        )
        RETURNING {}",
      ATTEMPT_COLUMNS
    ))
    .bind(order_id)
    .bind(settlement.status)
    .bind(settlement.gateway_transaction_id)
    .bind(settlement.raw_response)
    .bind(settlement.failure_reason)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(Into::into))
  }

  async fn payment_attempts(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, StoreError> {
    let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
      "SELECT {} FROM payment_attempts WHERE order_id = $1 ORDER BY created_at",
      ATTEMPT_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
  }

  async fn record_webhook_delivery(&self, delivery: NewWebhookDelivery) -> Result<WebhookDelivery, StoreError> {
    let record = WebhookDelivery::from_new(delivery, Utc::now());
    sqlx::query(
      "INSERT INTO webhook_deliveries (id, source, event_type, shipment_id, order_number, outcome, is_success,
          message, payload, received_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(&record.source)
    .bind(&record.event_type)
    .bind(&record.shipment_id)
    .bind(&record.order_number)
    .bind(record.outcome)
    .bind(record.is_success)
    .bind(&record.message)
    .bind(&record.payload)
    .bind(record.received_at)
    .execute(&self.pool)
    .await?;
    Ok(record)
  }

  async fn webhook_deliveries(&self, limit: usize) -> Result<Vec<WebhookDelivery>, StoreError> {
    let rows: Vec<DeliveryRow> = sqlx::query_as(
      "SELECT id, source, event_type, shipment_id, order_number, outcome, is_success, message, payload, received_at
         FROM webhook_deliveries ORDER BY received_at DESC LIMIT $1",
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
  }
}
