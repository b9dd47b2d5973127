// service/src/gateways/payment/signing.rs

//! Request signature: SHA-256 over the windows-1254 bytes of
//! `merchant code + GUID + installments + amount + amount + order ref`,
//! base64 encoded. Amounts use the provider's `1234,50` format.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use encoding_rs::WINDOWS_1254;
use rust_decimal::{Decimal, RoundingStrategy};
use sha2::{Digest, Sha256};

/// Two fraction digits, comma decimal separator, no grouping.
pub fn format_amount(amount: Decimal) -> String {
  let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
  format!("{:.2}", rounded).replace('.', ",")
}

#[derive(Debug, Clone)]
pub struct SignatureInput<'a> {
  pub merchant_code: &'a str,
  pub guid: &'a str,
  pub installments: u32,
  pub amount: Decimal,
  pub order_ref: &'a str,
}

impl SignatureInput<'_> {
  pub fn plaintext(&self) -> String {
    let amount = format_amount(self.amount);
    format!(
      "{}{}{}{}{}{}",
      self.merchant_code, self.guid, self.installments, amount, amount, self.order_ref
    )
  }

  pub fn sign(&self) -> String {
    let plaintext = self.plaintext();
    // ISO-8859-9 text; windows-1254 is the superset the provider decodes with.
    let (bytes, _, had_unmappable) = WINDOWS_1254.encode(&plaintext);
    if had_unmappable {
      tracing::warn!("Signature input has characters outside windows-1254.");
    }
    BASE64.encode(Sha256::digest(&bytes))
  }
}
