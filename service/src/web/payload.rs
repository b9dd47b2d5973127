// service/src/web/payload.rs

//! Flattens a payment callback into `(name, value)` pairs, whatever the
//! provider posted: form fields, multipart, JSON or just a query string.

use crate::errors::AppError;
use actix_multipart::Multipart;
use actix_web::error::PayloadError;
use actix_web::http::header::{HeaderMap, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::HttpRequest;
use futures_util::{stream, TryStreamExt};
use serde_json::Value;

/// Body fields first, then query-string fields, so body values win when the
/// dialect lookup takes the first match.
pub async fn callback_fields(req: &HttpRequest, body: Bytes) -> Result<Vec<(String, String)>, AppError> {
  let mut fields = body_fields(req.headers(), body).await?;
  let query: Vec<(String, String)> = serde_urlencoded::from_str(req.query_string())
    .map_err(|e| AppError::MalformedPayload(format!("invalid query string: {}", e)))?;
  fields.extend(query);
  Ok(fields)
}

async fn body_fields(headers: &HeaderMap, body: Bytes) -> Result<Vec<(String, String)>, AppError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Vec::new());
  }
  let content_type = headers
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_ascii_lowercase();

  if content_type.starts_with("multipart/form-data") {
    return multipart_fields(headers, body).await;
  }
  if content_type.contains("json") || body.first() == Some(&b'{') {
    return json_fields(&body);
  }
  serde_urlencoded::from_bytes(&body).map_err(|e| AppError::MalformedPayload(format!("invalid form body: {}", e)))
}

fn json_fields(body: &[u8]) -> Result<Vec<(String, String)>, AppError> {
  let value: Value =
    serde_json::from_slice(body).map_err(|e| AppError::MalformedPayload(format!("invalid JSON body: {}", e)))?;
  let Value::Object(map) = value else {
    return Err(AppError::MalformedPayload("JSON body is not an object".to_string()));
  };
  Ok(
    map
      .into_iter()
      .filter_map(|(k, v)| match v {
        Value::String(s) => Some((k, s)),
        Value::Number(n) => Some((k, n.to_string())),
        Value::Bool(b) => Some((k, b.to_string())),
        _ => None,
      })
      .collect(),
  )
}

async fn multipart_fields(headers: &HeaderMap, body: Bytes) -> Result<Vec<(String, String)>, AppError> {
  let malformed = |e: actix_multipart::MultipartError| AppError::MalformedPayload(format!("invalid multipart body: {}", e));
  let mut multipart = Multipart::new(headers, stream::once(async move { Ok::<_, PayloadError>(body) }));

  let mut fields = Vec::new();
  while let Some(mut field) = multipart.try_next().await.map_err(malformed)? {
    let Some(name) = field.name().map(str::to_string) else {
      continue;
    };
    let mut value = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
      value.extend_from_slice(&chunk);
    }
    fields.push((name, String::from_utf8_lossy(&value).into_owned()));
  }
  Ok(fields)
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::test::TestRequest;

  #[actix_web::test]
  async fn form_body_then_query() {
    let req = TestRequest::post()
      .uri("/cb?Siparis_ID=ORD-Q&extra=1")
      .insert_header((CONTENT_TYPE, "application/x-www-form-urlencoded"))
      .to_http_request();
    let fields = callback_fields(&req, Bytes::from_static(b"Siparis_ID=ORD-B&Sonuc=1"))
      .await
      .unwrap();
    assert_eq!(fields[0], ("Siparis_ID".to_string(), "ORD-B".to_string()));
    assert!(fields.contains(&("extra".to_string(), "1".to_string())));
  }

  #[actix_web::test]
  async fn json_scalars_are_kept() {
    let req = TestRequest::post()
      .insert_header((CONTENT_TYPE, "application/json"))
      .to_http_request();
    let fields = callback_fields(&req, Bytes::from_static(br#"{"orderId":"ORD-1","resultCode":1,"nested":{"a":1}}"#))
      .await
      .unwrap();
    assert!(fields.contains(&("resultCode".to_string(), "1".to_string())));
    assert!(!fields.iter().any(|(k, _)| k == "nested"));
  }

  #[actix_web::test]
  async fn multipart_body() {
    let body = "--XyZ\r\nContent-Disposition: form-data; name=\"Siparis_ID\"\r\n\r\nORD-M\r\n--XyZ\r\nContent-Disposition: form-data; name=\"Sonuc\"\r\n\r\n1\r\n--XyZ--\r\n";
    let req = TestRequest::post()
      .insert_header((CONTENT_TYPE, "multipart/form-data; boundary=XyZ"))
      .to_http_request();
    let fields = callback_fields(&req, Bytes::from(body)).await.unwrap();
    assert_eq!(
      fields,
      vec![
        ("Siparis_ID".to_string(), "ORD-M".to_string()),
        ("Sonuc".to_string(), "1".to_string())
      ]
    );
  }

  #[actix_web::test]
  async fn empty_get_uses_query_only() {
    let req = TestRequest::get().uri("/cb?orderId=ORD-G&status=1").to_http_request();
    let fields = callback_fields(&req, Bytes::new()).await.unwrap();
    assert_eq!(fields.len(), 2);
  }
}
