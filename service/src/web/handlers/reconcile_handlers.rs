// service/src/web/handlers/reconcile_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
  pub token: Option<String>,
}

/// Compares digests so the comparison time does not depend on the token.
fn token_matches(expected: &str, provided: &str) -> bool {
  Sha256::digest(expected.as_bytes()) == Sha256::digest(provided.as_bytes())
}

/// Runs one reconciliation pass for an external scheduler.
#[instrument(name = "handler::trigger_reconciliation", skip(app_state, query))]
pub async fn trigger_reconciliation_handler(
  app_state: web::Data<AppState>,
  query: web::Query<TriggerQuery>,
) -> Result<HttpResponse, AppError> {
  if let Some(expected) = &app_state.config.reconcile.trigger_token {
    let provided = query.token.as_deref().unwrap_or_default();
    if !token_matches(expected, provided) {
      return Err(AppError::Unauthorized("invalid reconciliation token".to_string()));
    }
  }

  let report = app_state.reconciler.run_pass().await?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "stats": {
      "checked": report.checked,
      "updated": report.updated,
      "errors": report.errors,
      "duration": report.duration_ms,
    },
    "updates": report.updates,
  })))
}
