// service/src/errors.rs

use crate::config::ConfigError;
use crate::gateways::GatewayError;
use crate::lifecycle::StoreError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use parcelpay_flow::FlowError;
use serde_json::json;
use thiserror::Error;

/// Error returned by every pipeline handler and HTTP handler.
#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Signature Invalid: {0}")]
  SignatureInvalid(String),

  #[error("Malformed Payload: {0}")]
  MalformedPayload(String),

  #[error("Order Not Found: {0}")]
  OrderNotFound(String),

  #[error("Unauthorized: {0}")]
  Unauthorized(String),

  #[error("Gateway Rejected ({code}): {message}")]
  GatewayRejected { code: String, message: String },

  #[error("Gateway Unreachable: {0}")]
  GatewayUnreachable(String),

  #[error("Gateway Response Malformed: {0}")]
  GatewayMalformed(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Configuration Error: {0}")]
  Config(#[from] ConfigError),

  #[error("Store Error: {0}")]
  Store(#[from] StoreError),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<GatewayError> for AppError {
  fn from(err: GatewayError) -> Self {
    match err {
      GatewayError::Unreachable(m) => AppError::GatewayUnreachable(m),
      GatewayError::Rejected { code, message } => AppError::GatewayRejected { code, message },
      GatewayError::MalformedResponse(m) => AppError::GatewayMalformed(m),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    AppError::Internal(err.to_string())
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) | AppError::SignatureInvalid(_) | AppError::MalformedPayload(_) => {
        StatusCode::BAD_REQUEST
      }
      AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
      AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      AppError::GatewayRejected { .. } => StatusCode::PAYMENT_REQUIRED,
      AppError::GatewayUnreachable(_) | AppError::GatewayMalformed(_) => StatusCode::BAD_GATEWAY,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
      AppError::Store(StoreError::IllegalTransition { .. }) => StatusCode::CONFLICT,
      AppError::Config(_) | AppError::Store(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Responding with error");
    }
    // Internal details stay in the logs.
    let message = match self {
      AppError::Store(StoreError::Database(_)) => "Database operation failed".to_string(),
      AppError::Config(_) => "Configuration issue".to_string(),
      AppError::Workflow { .. } => "Workflow processing error".to_string(),
      other => other.to_string(),
    };
    let mut body = json!({ "success": false, "error": message });
    if let AppError::GatewayRejected { code, .. } = self {
      body["code"] = json!(code);
    }
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
