// service/src/gateways/shipping/client.rs

use crate::config::ShippingGatewayConfig;
use crate::gateways::shipping::{
  AcceptedOffer, CarrierStatus, Offer, ReturnRequest, SenderProfile, ShipmentRequest, ShippingGateway, TrackingStatus,
};
use crate::gateways::GatewayError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

/// `{ result, message, data }` wrapper around every broker response.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
  result: bool,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  code: Option<String>,
  data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct IdData {
  id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferData {
  id: String,
  #[serde(alias = "providerCode")]
  carrier: String,
  #[serde(default, alias = "providerServiceCode")]
  service_code: Option<String>,
  amount: Decimal,
  #[serde(default = "default_currency")]
  currency: String,
}

fn default_currency() -> String {
  "TRY".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionData {
  id: String,
  shipment: TransactionShipment,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionShipment {
  #[serde(default, alias = "barcode")]
  tracking_number: Option<String>,
  #[serde(default)]
  tracking_url: Option<String>,
  #[serde(default, alias = "labelURL")]
  label_url: Option<String>,
  #[serde(default, alias = "responsiveLabelURL")]
  label_pdf_url: Option<String>,
  #[serde(default, alias = "providerCode")]
  carrier: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentData {
  id: String,
  #[serde(default)]
  tracking_status: Option<TrackingStatusData>,
  #[serde(default, alias = "barcode")]
  tracking_number: Option<String>,
  #[serde(default)]
  tracking_url: Option<String>,
  #[serde(default, alias = "labelURL")]
  label_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackingStatusData {
  #[serde(alias = "statusCode")]
  tracking_status_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateShipmentBody<'a> {
  sender_address_id: &'a str,
  recipient_address: serde_json::Value,
  length: String,
  width: String,
  height: String,
  distance_unit: &'a str,
  weight: String,
  mass_unit: &'a str,
  order: serde_json::Value,
  test: bool,
}

/// JSON/REST client for the cargo broker.
pub struct ShippingApiClient {
  http: reqwest::Client,
  config: ShippingGatewayConfig,
}

impl ShippingApiClient {
  pub fn new(config: ShippingGatewayConfig) -> Result<Self, GatewayError> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| GatewayError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self { http, config })
  }

  async fn request<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
  ) -> Result<Option<T>, GatewayError> {
    let url = format!("{}{}", self.config.api_url, path);
    let mut builder = self.http.request(method, &url).bearer_auth(&self.config.api_token);
    if let Some(body) = body {
      builder = builder.json(&body);
    }
    let response = builder.send().await.map_err(GatewayError::from_transport)?;
    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
      return Err(GatewayError::Unreachable(format!("broker answered HTTP {}", status)));
    }
    let text = response.text().await.map_err(GatewayError::from_transport)?;
    decode_envelope(status, &text)
  }

  async fn expect_data<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    body: Option<serde_json::Value>,
  ) -> Result<T, GatewayError> {
    self
      .request(method, path, body)
      .await?
      .ok_or_else(|| GatewayError::MalformedResponse(format!("no data in broker response for {}", path)))
  }
}

fn decode_envelope<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<Option<T>, GatewayError> {
  let envelope: ApiEnvelope<T> = serde_json::from_str(text).map_err(|e| {
    if status.is_success() {
      GatewayError::MalformedResponse(format!("invalid broker JSON: {}", e))
    } else {
      GatewayError::Rejected {
        code: status.as_u16().to_string(),
        message: text.chars().take(200).collect(),
      }
    }
  })?;
  if !envelope.result || !status.is_success() {
    return Err(GatewayError::Rejected {
      code: envelope.code.unwrap_or_else(|| status.as_u16().to_string()),
      message: envelope.message.unwrap_or_else(|| "request rejected by broker".to_string()),
    });
  }
  Ok(envelope.data)
}

#[async_trait]
impl ShippingGateway for ShippingApiClient {
  #[instrument(name = "shipping_gateway::create_sender", skip_all, err(Display))]
  async fn create_sender(&self, profile: &SenderProfile) -> Result<String, GatewayError> {
    let body = serde_json::to_value(profile).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    let data: IdData = self.expect_data(Method::POST, "/senders", Some(body)).await?;
    Ok(data.id)
  }

  #[instrument(name = "shipping_gateway::create_shipment", skip_all, fields(order_ref = %request.order_ref, test = request.test), err(Display))]
  async fn create_shipment(&self, request: &ShipmentRequest) -> Result<String, GatewayError> {
    let recipient = &request.recipient;
    let body = CreateShipmentBody {
      sender_address_id: &request.sender_id,
      recipient_address: json!({
        "name": recipient.full_name,
        "phone": recipient.phone,
        "email": recipient.email,
        "address1": recipient.line1,
        "address2": recipient.line2,
        "district": recipient.district,
        "city": recipient.city,
        "zip": recipient.postal_code,
        "countryCode": recipient.country_code,
      }),
      length: request.parcel.length.to_string(),
      width: request.parcel.width.to_string(),
      height: request.parcel.height.to_string(),
      distance_unit: &request.parcel.distance_unit,
      weight: request.parcel.weight.to_string(),
      mass_unit: &request.parcel.mass_unit,
      order: json!({
        "orderNumber": request.order_ref,
        "totalAmount": request.amount.to_string(),
        "totalAmountCurrency": "TRY",
      }),
      test: request.test,
    };
    let body = serde_json::to_value(&body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
    let data: IdData = self.expect_data(Method::POST, "/shipments", Some(body)).await?;
    Ok(data.id)
  }

  #[instrument(name = "shipping_gateway::get_offers", skip(self), err(Display))]
  async fn get_offers(&self, shipment_id: &str) -> Result<Vec<Offer>, GatewayError> {
    let offers: Vec<OfferData> = self
      .request(Method::GET, &format!("/shipments/{}/offers", shipment_id), None)
      .await?
      .unwrap_or_default();
    Ok(
      offers
        .into_iter()
        .map(|o| Offer {
          id: o.id,
          carrier: o.carrier,
          service_code: o.service_code,
          amount: o.amount,
          currency: o.currency,
        })
        .collect(),
    )
  }

  #[instrument(name = "shipping_gateway::accept_offer", skip(self), err(Display))]
  async fn accept_offer(&self, offer_id: &str) -> Result<AcceptedOffer, GatewayError> {
    let data: TransactionData = self
      .expect_data(Method::POST, "/transactions", Some(json!({ "offerID": offer_id })))
      .await?;
    Ok(AcceptedOffer {
      transaction_id: data.id,
      tracking_number: data.shipment.tracking_number,
      tracking_url: data.shipment.tracking_url,
      label_url: data.shipment.label_url,
      label_pdf_url: data.shipment.label_pdf_url,
      carrier: data.shipment.carrier,
    })
  }

  #[instrument(name = "shipping_gateway::get_tracking", skip(self), err(Display))]
  async fn get_tracking(&self, shipment_id: &str) -> Result<TrackingStatus, GatewayError> {
    let data: ShipmentData = self
      .expect_data(Method::GET, &format!("/shipments/{}", shipment_id), None)
      .await?;
    let status = data
      .tracking_status
      .map(|t| CarrierStatus::parse(&t.tracking_status_code))
      .unwrap_or_else(|| CarrierStatus::Other("UNKNOWN".to_string()));
    Ok(TrackingStatus {
      shipment_id: data.id,
      status,
      tracking_number: data.tracking_number,
      tracking_url: data.tracking_url,
      label_url: data.label_url,
    })
  }

  #[instrument(name = "shipping_gateway::cancel", skip(self), err(Display))]
  async fn cancel(&self, shipment_id: &str) -> Result<(), GatewayError> {
    self
      .request::<serde_json::Value>(Method::DELETE, &format!("/shipments/{}", shipment_id), None)
      .await?;
    Ok(())
  }

  #[instrument(name = "shipping_gateway::create_return", skip(self, request), err(Display))]
  async fn create_return(&self, shipment_id: &str, request: &ReturnRequest) -> Result<String, GatewayError> {
    let body = json!({
      "willAccept": true,
      "providerServiceCode": request.service_code,
      "reason": request.reason,
      "count": 1,
    });
    let data: IdData = self
      .expect_data(Method::POST, &format!("/shipments/{}/return", shipment_id), Some(body))
      .await?;
    Ok(data.id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejected_envelope_carries_broker_message() {
    let err = decode_envelope::<IdData>(
      StatusCode::BAD_REQUEST,
      r#"{"result":false,"code":"SENDER_INVALID","message":"Sender address not found"}"#,
    )
    .unwrap_err();
    assert_eq!(
      err,
      GatewayError::Rejected {
        code: "SENDER_INVALID".into(),
        message: "Sender address not found".into()
      }
    );
  }

  #[test]
  fn success_envelope_yields_data() {
    let data = decode_envelope::<IdData>(StatusCode::OK, r#"{"result":true,"data":{"id":"shp_123"}}"#)
      .unwrap()
      .unwrap();
    assert_eq!(data.id, "shp_123");
  }

  #[test]
  fn offers_accept_broker_field_names() {
    let offers = decode_envelope::<Vec<OfferData>>(
      StatusCode::OK,
      r#"{"result":true,"data":[{"id":"of_1","providerCode":"YURTICI","amount":"84.50","currency":"TRY"}]}"#,
    )
    .unwrap()
    .unwrap();
    assert_eq!(offers[0].carrier, "YURTICI");
    assert_eq!(offers[0].amount, Decimal::new(8450, 2));
  }

  #[test]
  fn invalid_json_on_success_is_malformed() {
    assert!(matches!(
      decode_envelope::<IdData>(StatusCode::OK, "<html>"),
      Err(GatewayError::MalformedResponse(_))
    ));
  }
}
