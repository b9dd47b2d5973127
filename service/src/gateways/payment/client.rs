// service/src/gateways/payment/client.rs

use crate::config::PaymentGatewayConfig;
use crate::gateways::payment::envelope::{self, Credentials, Operation, ProviderResponse};
use crate::gateways::payment::signing::{format_amount, SignatureInput};
use crate::gateways::payment::{is_success_code, CallbackUrls, CardData, LogicalField, PaymentGateway, PaymentResult};
use crate::gateways::GatewayError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use rust_decimal::Decimal;
use tracing::instrument;

/// What a successful answer must carry besides the result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
  Capture,
  Redirect,
  HostedSession,
}

pub struct PosGatewayClient {
  http: reqwest::Client,
  config: PaymentGatewayConfig,
}

impl PosGatewayClient {
  pub fn new(config: PaymentGatewayConfig) -> Result<Self, GatewayError> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| GatewayError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self { http, config })
  }

  fn credentials(&self) -> Credentials<'_> {
    Credentials {
      merchant_code: &self.config.merchant_code,
      username: &self.config.username,
      password: &self.config.password,
      guid: &self.config.guid,
    }
  }

  fn signature(&self, order_ref: &str, amount: Decimal, installments: u32) -> String {
    SignatureInput {
      merchant_code: &self.config.merchant_code,
      guid: &self.config.guid,
      installments,
      amount,
      order_ref,
    }
    .sign()
  }

  fn card_fields(card: &CardData) -> Vec<(&'static str, String)> {
    let year = card.expiry_year.trim();
    let year = if year.len() == 4 { &year[2..] } else { year };
    vec![
      ("KK_Sahibi", card.holder_name.trim().to_string()),
      ("KK_No", card.normalized_number()),
      ("KK_SK_Ay", format!("{:0>2}", card.expiry_month.trim())),
      ("KK_SK_Yil", year.to_string()),
      ("KK_CVC", card.cvc.trim().to_string()),
    ]
  }

  fn sale_fields(order_ref: &str, amount: Decimal, installments: u32, hash: String) -> Vec<(&'static str, String)> {
    let formatted = format_amount(amount);
    vec![
      ("Siparis_ID", order_ref.to_string()),
      ("Siparis_Aciklama", format!("Order {}", order_ref)),
      ("Taksit", installments.to_string()),
      ("Islem_Tutar", formatted.clone()),
      ("Toplam_Tutar", formatted),
      ("Islem_Hash", hash),
    ]
  }

  async fn call(&self, operation: Operation, fields: &[(&str, String)]) -> Result<ProviderResponse, GatewayError> {
    let body = envelope::build_request(operation, &self.credentials(), fields);
    let response = self
      .http
      .post(&self.config.endpoint)
      .header(CONTENT_TYPE, "text/xml; charset=utf-8")
      .header("SOAPAction", operation.soap_action())
      .body(body)
      .send()
      .await
      .map_err(GatewayError::from_transport)?;

    let status = response.status();
    let text = response.text().await.map_err(GatewayError::from_transport)?;
    // SOAP faults arrive with HTTP 500, so the body is parsed before the status is judged.
    match envelope::parse_response(&text) {
      Ok(parsed) => Ok(parsed),
      Err(GatewayError::MalformedResponse(_)) if !status.is_success() => {
        Err(GatewayError::Unreachable(format!("provider answered HTTP {}", status)))
      }
      Err(e) => Err(e),
    }
  }

  fn interpret(&self, response: &ProviderResponse, expect: Expect) -> Result<PaymentResult, GatewayError> {
    let code = response
      .get(LogicalField::ResultCode)
      .ok_or_else(|| GatewayError::MalformedResponse("no result code in provider response".into()))?;
    let message = response.get(LogicalField::ResultMessage).unwrap_or_default().to_string();

    if !is_success_code(code) {
      return Err(GatewayError::Rejected {
        code: code.to_string(),
        message: if message.is_empty() {
          "payment declined by provider".to_string()
        } else {
          message
        },
      });
    }

    let redirect_url = match expect {
      Expect::Capture => None,
      Expect::Redirect => Some(
        response
          .get(LogicalField::RedirectUrl)
          .ok_or_else(|| GatewayError::MalformedResponse("3-D response without redirect URL".into()))?
          .to_string(),
      ),
      Expect::HostedSession => match response.get(LogicalField::RedirectUrl) {
        Some(url) => Some(url.to_string()),
        None => {
          let token = response
            .get(LogicalField::SessionToken)
            .ok_or_else(|| GatewayError::MalformedResponse("hosted response without URL or token".into()))?;
          Some(format!("{}?token={}", self.config.hosted_page_url.trim_end_matches('/'), token))
        }
      },
    };

    Ok(PaymentResult {
      success: true,
      transaction_id: response.get(LogicalField::TransactionId).map(str::to_string),
      message,
      error_code: None,
      redirect_url,
      raw: response.to_json(),
    })
  }
}

#[async_trait]
impl PaymentGateway for PosGatewayClient {
  #[instrument(name = "payment_gateway::process_direct", skip(self, card), fields(card = %card.masked_number()), err(Display))]
  async fn process_direct(
    &self,
    order_ref: &str,
    amount: Decimal,
    card: &CardData,
    installments: u32,
  ) -> Result<PaymentResult, GatewayError> {
    let hash = self.signature(order_ref, amount, installments);
    let mut fields = Self::card_fields(card);
    fields.push(("Islem_Guvenlik_Tip", "NS".to_string()));
    fields.extend(Self::sale_fields(order_ref, amount, installments, hash));

    let response = self.call(Operation::CardSale, &fields).await?;
    let result = self.interpret(&response, Expect::Capture)?;
    tracing::info!(transaction_id = ?result.transaction_id, "Direct capture approved.");
    Ok(result)
  }

  #[instrument(name = "payment_gateway::init_redirect", skip(self, card, callbacks), fields(card = %card.masked_number()), err(Display))]
  async fn init_redirect_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    card: &CardData,
    installments: u32,
    callbacks: &CallbackUrls,
  ) -> Result<PaymentResult, GatewayError> {
    let hash = self.signature(order_ref, amount, installments);
    let mut fields = Self::card_fields(card);
    fields.push(("Islem_Guvenlik_Tip", "3D".to_string()));
    fields.push(("Hata_URL", callbacks.failure_url.clone()));
    fields.push(("Basarili_URL", callbacks.success_url.clone()));
    fields.extend(Self::sale_fields(order_ref, amount, installments, hash));

    let response = self.call(Operation::CardSale, &fields).await?;
    self.interpret(&response, Expect::Redirect)
  }

  #[instrument(name = "payment_gateway::init_hosted", skip(self, customer_phone), err(Display))]
  async fn init_hosted_payment(
    &self,
    order_ref: &str,
    amount: Decimal,
    customer_phone: &str,
    callback_url: &str,
  ) -> Result<PaymentResult, GatewayError> {
    let hash = self.signature(order_ref, amount, 1);
    let mut fields = vec![
      ("KK_Sahibi_GSM", customer_phone.to_string()),
      ("Hata_URL", callback_url.to_string()),
      ("Basarili_URL", callback_url.to_string()),
    ];
    fields.extend(Self::sale_fields(order_ref, amount, 1, hash));

    let response = self.call(Operation::HostedSale, &fields).await?;
    self.interpret(&response, Expect::HostedSession)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn client() -> PosGatewayClient {
    PosGatewayClient::new(PaymentGatewayConfig {
      endpoint: "http://127.0.0.1:9/service.asmx".into(),
      merchant_code: "10738".into(),
      username: "test".into(),
      password: "test".into(),
      guid: "0c13d406-873b-403b-9c09-a5766840d98c".into(),
      hosted_page_url: "https://pos.example/hosted/".into(),
      timeout: Duration::from_secs(1),
    })
    .unwrap()
  }

  #[test]
  fn declined_code_is_rejected_with_provider_message() {
    let response = ProviderResponse::from_pairs([("Sonuc", "-2"), ("Sonuc_Str", "Yetersiz bakiye")]);
    let err = client().interpret(&response, Expect::Capture).unwrap_err();
    assert_eq!(
      err,
      GatewayError::Rejected {
        code: "-2".into(),
        message: "Yetersiz bakiye".into()
      }
    );
  }

  #[test]
  fn hosted_token_becomes_redirect_url() {
    let response = ProviderResponse::from_pairs([("ResultCode", "1"), ("Token", "sess-42")]);
    let result = client().interpret(&response, Expect::HostedSession).unwrap();
    assert_eq!(result.redirect_url.as_deref(), Some("https://pos.example/hosted?token=sess-42"));
  }

  #[test]
  fn three_d_without_url_is_malformed() {
    let response = ProviderResponse::from_pairs([("Sonuc", "1")]);
    assert!(matches!(
      client().interpret(&response, Expect::Redirect),
      Err(GatewayError::MalformedResponse(_))
    ));
  }

  #[tokio::test]
  async fn closed_port_is_unreachable() {
    let card = CardData {
      holder_name: "Test".into(),
      number: "4022774022774026".into(),
      expiry_month: "12".into(),
      expiry_year: "30".into(),
      cvc: "000".into(),
    };
    let err = client()
      .process_direct("ORD-1", Decimal::new(61990, 2), &card, 1)
      .await
      .unwrap_err();
    assert!(matches!(err, GatewayError::Unreachable(_)));
  }
}
