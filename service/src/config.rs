// service/src/config.rs

use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("Missing environment variable '{0}'")]
  Missing(String),

  #[error("Invalid value for '{var}': {reason}")]
  Invalid { var: String, reason: String },

  #[error("'{0}' is not allowed when APP_ENV=production")]
  ForbiddenInProduction(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
  Development,
  Production,
}

impl AppEnv {
  pub fn is_production(self) -> bool {
    self == AppEnv::Production
  }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  pub base_url: String,
  pub env: AppEnv,
}

#[derive(Clone)]
pub struct PaymentGatewayConfig {
  pub endpoint: String,
  pub merchant_code: String,
  pub username: String,
  pub password: String,
  pub guid: String,
  pub hosted_page_url: String,
  pub timeout: Duration,
}

impl std::fmt::Debug for PaymentGatewayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PaymentGatewayConfig")
      .field("endpoint", &self.endpoint)
      .field("merchant_code", &self.merchant_code)
      .field("username", &self.username)
      .field("password", &"[REDACTED]")
      .field("guid", &"[REDACTED]")
      .field("hosted_page_url", &self.hosted_page_url)
      .field("timeout", &self.timeout)
      .finish()
  }
}

#[derive(Clone)]
pub struct ShippingGatewayConfig {
  pub api_url: String,
  pub api_token: String,
  pub sender_id: Option<String>,
  /// Sent on every shipment creation. Never inferred from the environment name.
  pub test_mode: bool,
  pub timeout: Duration,
  pub auto_create_on_payment: bool,
}

impl std::fmt::Debug for ShippingGatewayConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ShippingGatewayConfig")
      .field("api_url", &self.api_url)
      .field("api_token", &"[REDACTED]")
      .field("sender_id", &self.sender_id)
      .field("test_mode", &self.test_mode)
      .field("timeout", &self.timeout)
      .field("auto_create_on_payment", &self.auto_create_on_payment)
      .finish()
  }
}

#[derive(Clone)]
pub struct WebhookConfig {
  pub secret: Option<String>,
  pub signature_header: String,
  pub skip_signature: bool,
}

impl std::fmt::Debug for WebhookConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WebhookConfig")
      .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
      .field("signature_header", &self.signature_header)
      .field("skip_signature", &self.skip_signature)
      .finish()
  }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
  pub interval: Duration,
  pub call_delay: Duration,
  pub call_timeout: Duration,
  pub trigger_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedirectConfig {
  pub success_path: String,
  pub failure_path: String,
  pub callback_path: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub database_url: Option<String>,
  pub payment: PaymentGatewayConfig,
  pub shipping: ShippingGatewayConfig,
  pub webhook: WebhookConfig,
  pub reconcile: ReconcileConfig,
  pub redirects: RedirectConfig,
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the configuration from any variable lookup. `from_env` passes the
  /// process environment; tests pass a map.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let get_env = |var_name: &str| {
      lookup(var_name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing(var_name.to_string()))
    };
    let or_default = |var_name: &str, default: &str| get_env(var_name).unwrap_or_else(|_| default.to_string());

    let env = match or_default("APP_ENV", "development").to_ascii_lowercase().as_str() {
      "production" | "prod" => AppEnv::Production,
      "development" | "dev" | "test" => AppEnv::Development,
      other => {
        return Err(ConfigError::Invalid {
          var: "APP_ENV".into(),
          reason: format!("unknown environment '{}'", other),
        })
      }
    };
    let production = env.is_production();

    let host = or_default("SERVER_HOST", "127.0.0.1");
    let port: u16 = parse_var("SERVER_PORT", &or_default("SERVER_PORT", "8080"))?;
    let base_url = get_env("APP_BASE_URL")
      .unwrap_or_else(|_| format!("http://{}:{}", host, port))
      .trim_end_matches('/')
      .to_string();

    let database_url = match get_env("DATABASE_URL") {
      Ok(url) => Some(url),
      Err(e) if production => return Err(e),
      Err(_) => None,
    };

    let required_in_production = |var_name: &str, dev_default: &str| -> Result<String, ConfigError> {
      match get_env(var_name) {
        Ok(v) => Ok(v),
        Err(e) if production => Err(e),
        Err(_) => Ok(dev_default.to_string()),
      }
    };

    let payment = PaymentGatewayConfig {
      endpoint: required_in_production("PAYMENT_ENDPOINT", "https://test-pos.invalid/service.asmx")?,
      merchant_code: required_in_production("PAYMENT_MERCHANT_CODE", "10738")?,
      username: required_in_production("PAYMENT_USERNAME", "test")?,
      password: required_in_production("PAYMENT_PASSWORD", "test")?,
      guid: required_in_production("PAYMENT_GUID", "0c13d406-873b-403b-9c09-a5766840d98c")?,
      hosted_page_url: required_in_production("PAYMENT_HOSTED_PAGE_URL", "https://test-pos.invalid/hosted")?,
      timeout: Duration::from_secs(parse_var("PAYMENT_TIMEOUT_SECS", &or_default("PAYMENT_TIMEOUT_SECS", "30"))?),
    };

    let test_mode = match get_env("SHIPPING_TEST_MODE") {
      Ok(v) => parse_bool("SHIPPING_TEST_MODE", &v)?,
      Err(e) if production => return Err(e),
      Err(_) => true,
    };
    let shipping = ShippingGatewayConfig {
      api_url: required_in_production("SHIPPING_API_URL", "https://api.shipping.invalid/api/v1")?
        .trim_end_matches('/')
        .to_string(),
      api_token: required_in_production("SHIPPING_API_TOKEN", "test-token")?,
      sender_id: get_env("SHIPPING_SENDER_ID").ok(),
      test_mode,
      timeout: Duration::from_secs(parse_var("SHIPPING_TIMEOUT_SECS", &or_default("SHIPPING_TIMEOUT_SECS", "15"))?),
      auto_create_on_payment: parse_bool(
        "SHIPPING_AUTO_CREATE_ON_PAYMENT",
        &or_default("SHIPPING_AUTO_CREATE_ON_PAYMENT", "false"),
      )?,
    };

    let skip_signature = parse_bool(
      "SHIPPING_WEBHOOK_SKIP_SIGNATURE",
      &or_default("SHIPPING_WEBHOOK_SKIP_SIGNATURE", "false"),
    )?;
    if skip_signature && production {
      return Err(ConfigError::ForbiddenInProduction("SHIPPING_WEBHOOK_SKIP_SIGNATURE".into()));
    }
    let webhook = WebhookConfig {
      secret: match get_env("SHIPPING_WEBHOOK_SECRET") {
        Ok(v) => Some(v),
        Err(e) if production => return Err(e),
        Err(_) => None,
      },
      signature_header: or_default("SHIPPING_WEBHOOK_SIGNATURE_HEADER", "x-webhook-signature").to_ascii_lowercase(),
      skip_signature,
    };

    let reconcile = ReconcileConfig {
      interval: Duration::from_secs(parse_var(
        "RECONCILE_INTERVAL_SECS",
        &or_default("RECONCILE_INTERVAL_SECS", "300"),
      )?),
      call_delay: Duration::from_millis(parse_var(
        "RECONCILE_CALL_DELAY_MS",
        &or_default("RECONCILE_CALL_DELAY_MS", "500"),
      )?),
      call_timeout: Duration::from_secs(parse_var(
        "RECONCILE_CALL_TIMEOUT_SECS",
        &or_default("RECONCILE_CALL_TIMEOUT_SECS", "20"),
      )?),
      trigger_token: get_env("RECONCILE_TRIGGER_TOKEN").ok(),
    };

    let redirects = RedirectConfig {
      success_path: or_default("PAYMENT_SUCCESS_PATH", "/checkout/success"),
      failure_path: or_default("PAYMENT_FAILURE_PATH", "/checkout/failed"),
      callback_path: or_default("PAYMENT_CALLBACK_PATH", "/api/v1/payments/callback"),
    };

    let config = Self {
      server: ServerConfig {
        host,
        port,
        base_url,
        env,
      },
      database_url,
      payment,
      shipping,
      webhook,
      reconcile,
      redirects,
    };
    tracing::info!(env = ?config.server.env, shipping_test_mode = config.shipping.test_mode, "Application configuration loaded.");
    tracing::debug!(payment = ?config.payment, shipping = ?config.shipping, "Gateway configuration.");
    Ok(config)
  }

  /// Absolute URL the payment provider calls back after authentication.
  pub fn payment_callback_url(&self) -> String {
    format!("{}{}", self.server.base_url, self.redirects.callback_path)
  }
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
    var: var.to_string(),
    reason: e.to_string(),
  })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    other => Err(ConfigError::Invalid {
      var: var.to_string(),
      reason: format!("expected a boolean, got '{}'", other),
    }),
  }
}
