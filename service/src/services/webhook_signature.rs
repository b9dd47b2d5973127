// service/src/services/webhook_signature.rs

//! HMAC-SHA256 signatures over raw webhook bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex digest the sender is expected to put in the signature header.
pub fn sign(secret: &str, body: &[u8]) -> String {
  // HMAC accepts keys of any length.
  let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
    Ok(mac) => mac,
    Err(_) => return String::new(),
  };
  mac.update(body);
  hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of `header` (`<hex>` or `sha256=<hex>`) against `body`.
pub fn verify(secret: &str, body: &[u8], header: &str) -> bool {
  let provided = header.trim();
  let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
  let Ok(expected) = hex::decode(provided) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  mac.verify_slice(&expected).is_ok()
}
