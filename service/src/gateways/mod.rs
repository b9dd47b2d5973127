// service/src/gateways/mod.rs

//! Stateless protocol translators for the card-payment provider and the
//! cargo broker. Neither adapter retries on its own.

pub mod payment;
pub mod shipping;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
  /// Network failure or timeout. Transient; the caller decides about retrying.
  #[error("gateway unreachable: {0}")]
  Unreachable(String),

  /// The provider declined. Terminal for this attempt.
  #[error("gateway rejected the request ({code}): {message}")]
  Rejected { code: String, message: String },

  #[error("malformed gateway response: {0}")]
  MalformedResponse(String),
}

impl GatewayError {
  pub(crate) fn from_transport(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      GatewayError::Unreachable(format!("timed out: {}", err))
    } else if err.is_decode() {
      GatewayError::MalformedResponse(err.to_string())
    } else {
      GatewayError::Unreachable(err.to_string())
    }
  }
}
