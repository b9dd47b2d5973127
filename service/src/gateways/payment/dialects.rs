// service/src/gateways/payment/dialects.rs

//! Field-name dialects of the payment provider.
//!
//! The legacy SOAP endpoints, the modal/hosted endpoints and the callback
//! posts name the same value differently. Each logical value has an ordered
//! list of candidate names; lookups try them in order and take the first
//! non-empty hit. Supporting a new dialect means adding a name here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
  OrderRef,
  ResultCode,
  ResultMessage,
  TransactionId,
  RedirectUrl,
  SessionToken,
}

const DIALECTS: &[(LogicalField, &[&str])] = &[
  (
    LogicalField::OrderRef,
    &[
      "Siparis_ID",
      "TURKPOS_RETVAL_Siparis_ID",
      "orderId",
      "OrderId",
      "order_id",
      "oid",
      "merchantOrderId",
      "orderNumber",
      "order_number",
    ],
  ),
  (
    LogicalField::ResultCode,
    &[
      "Sonuc",
      "TURKPOS_RETVAL_Sonuc",
      "ResultCode",
      "resultCode",
      "result_code",
      "Response",
      "status",
      "mdStatus",
    ],
  ),
  (
    LogicalField::ResultMessage,
    &[
      "Sonuc_Str",
      "TURKPOS_RETVAL_Sonuc_Str",
      "ResultMessage",
      "resultMessage",
      "result_message",
      "ErrMsg",
      "mdErrorMsg",
      "message",
    ],
  ),
  (
    LogicalField::TransactionId,
    &[
      "Islem_ID",
      "TURKPOS_RETVAL_Islem_ID",
      "Dekont_ID",
      "TURKPOS_RETVAL_Dekont_ID",
      "TransactionId",
      "transactionId",
      "transaction_id",
      "TransId",
    ],
  ),
  (LogicalField::RedirectUrl, &["UCD_URL", "URL_3DS", "RedirectUrl", "redirectUrl", "PaymentUrl"]),
  (LogicalField::SessionToken, &["Token", "SessionToken", "UCD_MD", "Islem_GUID"]),
];

pub fn candidates(field: LogicalField) -> &'static [&'static str] {
  DIALECTS
    .iter()
    .find(|(f, _)| *f == field)
    .map(|(_, names)| *names)
    .unwrap_or(&[])
}

/// First non-empty value among the candidate names of `field`.
pub fn extract<'a>(field: LogicalField, lookup: impl Fn(&str) -> Option<&'a str>) -> Option<&'a str> {
  candidates(field)
    .iter()
    .filter_map(|name| lookup(*name))
    .map(str::trim)
    .find(|value| !value.is_empty())
}

/// A positive number, or one of the textual success words.
pub fn is_success_code(code: &str) -> bool {
  let code = code.trim();
  if let Ok(n) = code.parse::<i64>() {
    return n > 0;
  }
  matches!(
    code.to_ascii_lowercase().as_str(),
    "success" | "approved" | "ok" | "true"
  )
}
