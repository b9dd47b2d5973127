// service/src/gateways/payment/mod.rs

//! Card-payment provider adapter: signed SOAP requests, tolerant response
//! parsing, and three payment modes.

pub mod client;
pub mod dialects;
pub mod envelope;
pub mod signing;

pub use client::PosGatewayClient;
pub use dialects::{is_success_code, LogicalField};

use crate::gateways::GatewayError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card details as entered by the customer. `Debug` never prints them.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
  pub holder_name: String,
  pub number: String,
  pub expiry_month: String,
  pub expiry_year: String,
  pub cvc: String,
}

impl CardData {
  pub fn masked_number(&self) -> String {
    let digits: String = self.number.chars().filter(|c| c.is_ascii_digit()).collect();
    let last4 = &digits[digits.len().saturating_sub(4)..];
    format!("**** **** **** {}", last4)
  }

  /// Digits of the card number without spaces or dashes.
  pub fn normalized_number(&self) -> String {
    self.number.chars().filter(|c| c.is_ascii_digit()).collect()
  }

  pub fn validate(&self) -> Result<(), String> {
    let number = self.normalized_number();
    if !(12..=19).contains(&number.len()) {
      return Err("card number must have 12 to 19 digits".into());
    }
    match self.expiry_month.trim().parse::<u8>() {
      Ok(m) if (1..=12).contains(&m) => {}
      _ => return Err("expiry month must be 01-12".into()),
    }
    let year = self.expiry_year.trim();
    if !(year.len() == 2 || year.len() == 4) || !year.chars().all(|c| c.is_ascii_digit()) {
      return Err("expiry year must be YY or YYYY".into());
    }
    let cvc = self.cvc.trim();
    if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
      return Err("cvc must be 3 or 4 digits".into());
    }
    if self.holder_name.trim().is_empty() {
      return Err("card holder name is required".into());
    }
    Ok(())
  }
}

impl fmt::Debug for CardData {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CardData")
      .field("holder_name", &self.holder_name)
      .field("number", &self.masked_number())
      .field("expiry", &"**/**")
      .field("cvc", &"***")
      .finish()
  }
}

/// Where the issuer sends the user-agent after step-up authentication.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
  pub success_url: String,
  pub failure_url: String,
}

/// Normalized provider answer. Only successful answers are returned as `Ok`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
  pub success: bool,
  pub transaction_id: Option<String>,
  pub message: String,
  pub error_code: Option<String>,
  pub redirect_url: Option<String>,
  /// Every field the provider returned, kept for audit.
  pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// Synchronous capture without redirect.
  async fn process_direct(
    &self,
    order_ref: &str,
    amount: Decimal,
    card: &CardData,
    installments: u32,
  ) -> Result<PaymentResult, GatewayError>;

  /// Starts a 3-D payment; the caller redirects to `redirect_url`.
  async fn init_redirect_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    card: &CardData,
    installments: u32,
    callbacks: &CallbackUrls,
  ) -> Result<PaymentResult, GatewayError>;

  /// Starts a payment on the provider's hosted card form. No card data is sent.
  async fn init_hosted_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    customer_phone: &str,
    callback_url: &str,
  ) -> Result<PaymentResult, GatewayError>;
}
