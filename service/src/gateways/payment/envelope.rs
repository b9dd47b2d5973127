// service/src/gateways/payment/envelope.rs

//! SOAP envelopes sent to and received from the payment provider.

use crate::gateways::payment::dialects::{self, LogicalField};
use crate::gateways::GatewayError;
use serde_json::{Map, Value};

pub const SERVICE_NAMESPACE: &str = "https://turkpos.com.tr/";

/// Provider operations used by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  /// Card sale; direct or 3-D depending on the security type field.
  CardSale,
  /// Hosted card form session.
  HostedSale,
}

impl Operation {
  pub fn name(self) -> &'static str {
    match self {
      Operation::CardSale => "TP_WMD_UCD",
      Operation::HostedSale => "TP_Modal_Payment",
    }
  }

  pub fn soap_action(self) -> String {
    format!("{}{}", SERVICE_NAMESPACE, self.name())
  }
}

/// Merchant credentials sent in the `G` block of every request.
#[derive(Debug, Clone)]
pub struct Credentials<'a> {
  pub merchant_code: &'a str,
  pub username: &'a str,
  pub password: &'a str,
  pub guid: &'a str,
}

pub fn escape_xml(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for c in value.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&apos;"),
      c => out.push(c),
    }
  }
  out
}

/// Builds the request envelope. `fields` are written in the given order.
pub fn build_request(operation: Operation, credentials: &Credentials<'_>, fields: &[(&str, String)]) -> String {
  let mut body = String::new();
  body.push_str(&format!(
    "<G><CLIENT_CODE>{}</CLIENT_CODE><CLIENT_USERNAME>{}</CLIENT_USERNAME><CLIENT_PASSWORD>{}</CLIENT_PASSWORD></G>",
    escape_xml(credentials.merchant_code),
    escape_xml(credentials.username),
    escape_xml(credentials.password)
  ));
  body.push_str(&format!("<GUID>{}</GUID>", escape_xml(credentials.guid)));
  for (name, value) in fields {
    body.push_str(&format!("<{0}>{1}</{0}>", name, escape_xml(value)));
  }

  format!(
    concat!(
      r#"<?xml version="1.0" encoding="utf-8"?>"#,
      r#"<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
      r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
      r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
      r#"<soap:Body><{op} xmlns="{ns}">{body}</{op}></soap:Body></soap:Envelope>"#
    ),
    op = operation.name(),
    ns = SERVICE_NAMESPACE,
    body = body
  )
}

/// Leaf elements of a provider response, in document order.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
  fields: Vec<(String, String)>,
}

impl ProviderResponse {
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }

  /// Raw lookup by exact element name; the first occurrence wins.
  pub fn raw(&self, name: &str) -> Option<&str> {
    self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
  }

  /// Lookup through the dialect table.
  pub fn get(&self, field: LogicalField) -> Option<&str> {
    dialects::extract(field, |name| self.raw(name))
  }

  pub fn to_json(&self) -> Value {
    let mut map = Map::new();
    for (k, v) in &self.fields {
      map.entry(k.clone()).or_insert_with(|| Value::String(v.clone()));
    }
    Value::Object(map)
  }
}

/// Parses a SOAP response. A SOAP fault becomes `GatewayError::Rejected`.
pub fn parse_response(xml: &str) -> Result<ProviderResponse, GatewayError> {
  let doc = roxmltree::Document::parse(xml)
    .map_err(|e| GatewayError::MalformedResponse(format!("invalid XML from provider: {}", e)))?;

  if let Some(fault) = doc.descendants().find(|n| n.is_element() && n.tag_name().name() == "Fault") {
    let text_of = |tag: &str| {
      fault
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
    };
    return Err(GatewayError::Rejected {
      code: text_of("faultcode").unwrap_or_else(|| "SOAP_FAULT".to_string()),
      message: text_of("faultstring").unwrap_or_else(|| "provider returned a SOAP fault".to_string()),
    });
  }

  let fields = doc
    .descendants()
    .filter(|n| n.is_element() && !n.children().any(|c| c.is_element()))
    .map(|n| (n.tag_name().name().to_string(), n.text().unwrap_or("").trim().to_string()))
    .collect::<Vec<_>>();

  if fields.is_empty() {
    return Err(GatewayError::MalformedResponse("provider response has no fields".into()));
  }
  Ok(ProviderResponse { fields })
}

#[cfg(test)]
mod tests {
  use super::*;

  const LEGACY_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <TP_WMD_UCDResponse xmlns="https://turkpos.com.tr/">
      <TP_WMD_UCDResult>
        <Islem_ID>6021840913</Islem_ID>
        <UCD_URL>https://bank.example/3d?token=abc</UCD_URL>
        <Sonuc>1</Sonuc>
        <Sonuc_Str>Islem Basarili</Sonuc_Str>
      </TP_WMD_UCDResult>
    </TP_WMD_UCDResponse>
  </soap:Body>
</soap:Envelope>"#;

  const MODAL_OK: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <TP_Modal_PaymentResponse xmlns="https://turkpos.com.tr/">
      <TP_Modal_PaymentResult>
        <ResultCode>1</ResultCode>
        <ResultMessage>OK</ResultMessage>
        <TransactionId>TX-99</TransactionId>
        <Token>sess-42</Token>
      </TP_Modal_PaymentResult>
    </TP_Modal_PaymentResponse>
  </soap:Body>
</soap:Envelope>"#;

  #[test]
  fn legacy_and_modal_dialects_normalize() {
    let legacy = parse_response(LEGACY_OK).unwrap();
    assert_eq!(legacy.get(LogicalField::ResultCode), Some("1"));
    assert_eq!(legacy.get(LogicalField::TransactionId), Some("6021840913"));
    assert_eq!(legacy.get(LogicalField::RedirectUrl), Some("https://bank.example/3d?token=abc"));

    let modal = parse_response(MODAL_OK).unwrap();
    assert_eq!(modal.get(LogicalField::ResultCode), Some("1"));
    assert_eq!(modal.get(LogicalField::ResultMessage), Some("OK"));
    assert_eq!(modal.get(LogicalField::TransactionId), Some("TX-99"));
    assert_eq!(modal.get(LogicalField::SessionToken), Some("sess-42"));
  }

  #[test]
  fn soap_fault_is_a_rejection() {
    let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
      <soap:Fault><faultcode>soap:Client</faultcode><faultstring>Invalid GUID</faultstring></soap:Fault>
      </soap:Body></soap:Envelope>"#;
    assert_eq!(
      parse_response(xml).unwrap_err(),
      GatewayError::Rejected {
        code: "soap:Client".into(),
        message: "Invalid GUID".into()
      }
    );
  }

  #[test]
  fn garbage_is_malformed() {
    assert!(matches!(
      parse_response("<html>502 Bad Gateway"),
      Err(GatewayError::MalformedResponse(_))
    ));
  }

  #[test]
  fn request_escapes_values() {
    let creds = Credentials {
      merchant_code: "10738",
      username: "user",
      password: "p&ss<",
      guid: "guid",
    };
    let xml = build_request(Operation::CardSale, &creds, &[("Siparis_ID", "A&B".to_string())]);
    assert!(xml.contains("<CLIENT_PASSWORD>p&amp;ss&lt;</CLIENT_PASSWORD>"));
    assert!(xml.contains("<Siparis_ID>A&amp;B</Siparis_ID>"));
    assert!(roxmltree::Document::parse(&xml).is_ok());
  }
}
