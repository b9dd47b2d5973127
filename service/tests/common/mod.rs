// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parcelpay_service::activity::{ActivityLog, ActivityLogWorker, MemoryActivitySink};
use parcelpay_service::cart::MemoryCartStore;
use parcelpay_service::config::AppConfig;
use parcelpay_service::gateways::payment::{CallbackUrls, CardData, PaymentGateway, PaymentResult};
use parcelpay_service::gateways::shipping::{
  AcceptedOffer, CarrierStatus, Offer, ReturnRequest, SenderProfile, ShipmentRequest, ShippingGateway, TrackingStatus,
};
use parcelpay_service::gateways::GatewayError;
use parcelpay_service::lifecycle::{MemoryOrderStore, OrderChange, OrderStore, PaymentCapture};
use parcelpay_service::models::{AddressSnapshot, NewOrder, NewOrderItem, Order, PaymentMethod, ShipmentInfo};
use parcelpay_service::services::webhook_signature;
use parcelpay_service::state::AppState;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

pub fn dec(value: &str) -> Decimal {
  Decimal::from_str(value).unwrap()
}

// --- Payment gateway fake ---

#[derive(Debug, Clone)]
pub enum PaymentBehavior {
  Approve,
  Decline { code: String, message: String },
  Unreachable,
}

#[derive(Debug, Clone)]
pub struct PaymentCall {
  pub operation: &'static str,
  pub order_ref: String,
  pub amount: Decimal,
  pub installments: u32,
  pub callback_url: Option<String>,
}

pub struct FakePayments {
  pub behavior: Mutex<PaymentBehavior>,
  pub calls: Mutex<Vec<PaymentCall>>,
}

impl FakePayments {
  pub fn new(behavior: PaymentBehavior) -> Self {
    Self {
      behavior: Mutex::new(behavior),
      calls: Mutex::new(Vec::new()),
    }
  }

  fn answer(&self, call: PaymentCall, redirect_url: Option<String>) -> Result<PaymentResult, GatewayError> {
    let order_ref = call.order_ref.clone();
    self.calls.lock().push(call);
    match self.behavior.lock().clone() {
      PaymentBehavior::Approve => Ok(PaymentResult {
        success: true,
        transaction_id: Some(format!("TX-{}", order_ref)),
        message: "Approved".to_string(),
        error_code: None,
        redirect_url,
        raw: serde_json::json!({ "Sonuc": "1", "Siparis_ID": order_ref }),
      }),
      PaymentBehavior::Decline { code, message } => Err(GatewayError::Rejected { code, message }),
      PaymentBehavior::Unreachable => Err(GatewayError::Unreachable("connection reset".to_string())),
    }
  }
}

#[async_trait]
impl PaymentGateway for FakePayments {
  async fn process_direct(
    &self,
    order_ref: &str,
    amount: Decimal,
    _card: &CardData,
    installments: u32,
  ) -> Result<PaymentResult, GatewayError> {
    let call = PaymentCall {
      operation: "direct",
      order_ref: order_ref.to_string(),
      amount,
      installments,
      callback_url: None,
    };
    self.answer(call, None)
  }

  async fn init_redirect_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    _card: &CardData,
    installments: u32,
    callbacks: &CallbackUrls,
  ) -> Result<PaymentResult, GatewayError> {
    let call = PaymentCall {
      operation: "three_d",
      order_ref: order_ref.to_string(),
      amount,
      installments,
      callback_url: Some(callbacks.success_url.clone()),
    };
    self.answer(call, Some(format!("https://bank.test/3d/{}", order_ref)))
  }

  async fn init_hosted_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    _customer_phone: &str,
    callback_url: &str,
  ) -> Result<PaymentResult, GatewayError> {
    let call = PaymentCall {
      operation: "hosted",
      order_ref: order_ref.to_string(),
      amount,
      installments: 1,
      callback_url: Some(callback_url.to_string()),
    };
    self.answer(call, Some(format!("https://pos.test/hosted?token={}", order_ref)))
  }
}

// --- Shipping gateway fake ---

#[derive(Debug, Clone)]
pub enum TrackingBehavior {
  Status(CarrierStatus),
  /// Never answers; the caller's timeout has to fire.
  Hang,
  Fail,
}

#[derive(Default)]
pub struct FakeShipping {
  pub tracking: Mutex<HashMap<String, TrackingBehavior>>,
  pub offers: Mutex<Vec<Offer>>,
  pub created: Mutex<Vec<ShipmentRequest>>,
  pub accepted: Mutex<Vec<String>>,
  pub cancelled: Mutex<Vec<String>>,
  /// Shipment id and clock reading of every tracking lookup.
  pub tracking_calls: Mutex<Vec<(String, tokio::time::Instant)>>,
}

impl FakeShipping {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_tracking(&self, shipment_id: &str, behavior: TrackingBehavior) {
    self.tracking.lock().insert(shipment_id.to_string(), behavior);
  }

  pub fn with_offers(self, offers: Vec<Offer>) -> Self {
    *self.offers.lock() = offers;
    self
  }
}

pub fn offer(id: &str, carrier: &str, amount: &str) -> Offer {
  Offer {
    id: id.to_string(),
    carrier: carrier.to_string(),
    service_code: Some("STANDARD".to_string()),
    amount: dec(amount),
    currency: "TRY".to_string(),
  }
}

#[async_trait]
impl ShippingGateway for FakeShipping {
  async fn create_sender(&self, profile: &SenderProfile) -> Result<String, GatewayError> {
    if profile.email.is_empty() {
      return Err(GatewayError::Rejected {
        code: "VALIDATION".to_string(),
        message: "email is required".to_string(),
      });
    }
    Ok("snd_1".to_string())
  }

  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<String, GatewayError> {
    let mut created = self.created.lock();
    created.push(request.clone());
    Ok(format!("shp_{}", created.len()))
  }

  async fn get_offers(&self, _shipment_id: &str) -> Result<Vec<Offer>, GatewayError> {
    Ok(self.offers.lock().clone())
  }

  async fn accept_offer(&self, offer_id: &str) -> Result<AcceptedOffer, GatewayError> {
    self.accepted.lock().push(offer_id.to_string());
    Ok(AcceptedOffer {
      transaction_id: format!("txn_{}", offer_id),
      tracking_number: Some(format!("TRK-{}", offer_id)),
      tracking_url: Some(format!("https://track.test/{}", offer_id)),
      label_url: Some(format!("https://label.test/{}.png", offer_id)),
      label_pdf_url: Some(format!("https://label.test/{}.pdf", offer_id)),
      carrier: None,
    })
  }

  async fn get_tracking(&self, shipment_id: &str) -> Result<TrackingStatus, GatewayError> {
    self
      .tracking_calls
      .lock()
      .push((shipment_id.to_string(), tokio::time::Instant::now()));
    let behavior = self.tracking.lock().get(shipment_id).cloned();
    match behavior {
      Some(TrackingBehavior::Status(status)) => Ok(TrackingStatus {
        shipment_id: shipment_id.to_string(),
        status,
        tracking_number: Some(format!("TRK-{}", shipment_id)),
        tracking_url: None,
        label_url: None,
      }),
      Some(TrackingBehavior::Hang) => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(GatewayError::Unreachable("hung".to_string()))
      }
      Some(TrackingBehavior::Fail) | None => Err(GatewayError::Unreachable("carrier API down".to_string())),
    }
  }

  async fn cancel(&self, shipment_id: &str) -> Result<(), GatewayError> {
    self.cancelled.lock().push(shipment_id.to_string());
    Ok(())
  }

  async fn create_return(&self, shipment_id: &str, _request: &ReturnRequest) -> Result<String, GatewayError> {
    Ok(format!("ret_{}", shipment_id))
  }
}

// --- Application fixture ---

pub fn config_with(overrides: &[(&str, &str)]) -> AppConfig {
  let mut vars: HashMap<String, String> = [
    ("APP_ENV", "development"),
    ("APP_BASE_URL", "https://shop.test"),
    ("SHIPPING_WEBHOOK_SECRET", WEBHOOK_SECRET),
    ("SHIPPING_SENDER_ID", "snd_1"),
    ("SHIPPING_TEST_MODE", "true"),
    ("RECONCILE_CALL_DELAY_MS", "0"),
    ("RECONCILE_CALL_TIMEOUT_SECS", "1"),
  ]
  .iter()
  .map(|(k, v)| (k.to_string(), v.to_string()))
  .collect();
  for (k, v) in overrides {
    vars.insert(k.to_string(), v.to_string());
  }
  AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("test config")
}

pub struct TestApp {
  pub state: AppState,
  pub orders: Arc<MemoryOrderStore>,
  pub carts: Arc<MemoryCartStore>,
  pub payments: Arc<FakePayments>,
  pub shipping: Arc<FakeShipping>,
  pub activity: MemoryActivitySink,
}

impl TestApp {
  pub fn new() -> Self {
    Self::with(config_with(&[]), PaymentBehavior::Approve, FakeShipping::new())
  }

  pub fn with(config: AppConfig, payment: PaymentBehavior, shipping: FakeShipping) -> Self {
    setup_tracing();
    let orders = Arc::new(MemoryOrderStore::new());
    let carts = Arc::new(MemoryCartStore::new());
    let payments = Arc::new(FakePayments::new(payment));
    let shipping = Arc::new(shipping);
    let activity = MemoryActivitySink::new();

    let (log, rx) = ActivityLog::channel(256);
    tokio::spawn(ActivityLogWorker::new(Arc::new(activity.clone())).run(rx));

    let state = AppState::build(
      Arc::new(config),
      orders.clone(),
      carts.clone(),
      payments.clone(),
      shipping.clone(),
      log,
    );
    Self {
      state,
      orders,
      carts,
      payments,
      shipping,
      activity,
    }
  }

  /// Waits until the activity worker has written a record with `action`.
  pub async fn wait_for_activity(&self, action: &str) -> bool {
    for _ in 0..100 {
      if self.activity.actions().iter().any(|a| a == action) {
        return true;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
  }

  /// A pending order with one tracked line (qty 2) and one untracked line.
  /// Total 619.90.
  pub async fn pending_order(&self) -> (Order, Uuid, Uuid) {
    let tracked = Uuid::new_v4();
    let untracked = Uuid::new_v4();
    self.orders.set_inventory(tracked, 10, true);
    self.orders.set_inventory(untracked, 0, false);
    let user_id = Uuid::new_v4();
    self.carts.add_item(user_id, tracked, 2);
    self.carts.add_item(user_id, untracked, 1);

    let order = self
      .orders
      .create_order(NewOrder {
        user_id: Some(user_id),
        subtotal: dec("589.90"),
        shipping_cost: dec("30.00"),
        tax: Decimal::ZERO,
        total: dec("619.90"),
        payment_method: PaymentMethod::Card,
        shipping_address: address(),
        billing_address: address(),
        items: vec![
          NewOrderItem {
            product_id: tracked,
            product_name: "Ceramic mug".to_string(),
            product_image: None,
            unit_price: dec("199.95"),
            quantity: 2,
          },
          NewOrderItem {
            product_id: untracked,
            product_name: "Gift card".to_string(),
            product_image: None,
            unit_price: dec("190.00"),
            quantity: 1,
          },
        ],
      })
      .await
      .unwrap();
    (order, tracked, untracked)
  }

  /// A paid `PROCESSING` order carrying `shipment_id`.
  pub async fn shipped_order(&self, shipment_id: &str) -> Order {
    let (order, _, _) = self.pending_order().await;
    self.orders.finalize_payment(order.id, PaymentCapture::default()).await.unwrap();
    self
      .orders
      .apply_change(
        order.id,
        OrderChange::shipment(ShipmentInfo {
          shipment_id: Some(shipment_id.to_string()),
          ..Default::default()
        }),
      )
      .await
      .unwrap()
      .order
  }

  pub async fn reload(&self, order: &Order) -> Order {
    self
      .orders
      .find_order(&parcelpay_service::models::OrderKey::Id(order.id))
      .await
      .unwrap()
      .unwrap()
  }
}

pub fn address() -> AddressSnapshot {
  AddressSnapshot {
    full_name: "Ayse Yilmaz".to_string(),
    phone: "5551112233".to_string(),
    email: Some("ayse@example.com".to_string()),
    line1: "Bagdat Cad. 12".to_string(),
    line2: None,
    district: "Kadikoy".to_string(),
    city: "Istanbul".to_string(),
    postal_code: Some("34710".to_string()),
    country_code: "TR".to_string(),
  }
}

pub fn signed(body: &str) -> String {
  webhook_signature::sign(WEBHOOK_SECRET, body.as_bytes())
}

/// Builds the actix app the way the binary does.
#[macro_export]
macro_rules! test_service {
  ($app:expr) => {{
    let state = $app.state.clone();
    let callback_path = state.config.redirects.callback_path.clone();
    actix_web::test::init_service(
      actix_web::App::new()
        .app_data(actix_web::web::Data::new(state))
        .configure(move |cfg| parcelpay_service::web::configure_app_routes(cfg, &callback_path)),
    )
    .await
  }};
}
