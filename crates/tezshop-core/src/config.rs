//! Application configuration.
//!
//! Every knob is an environment variable; `Settings::from_env` reads them
//! once at boot and the resulting value is shared behind an `Arc`.

use std::env;
use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration for the shop backend.
///
/// Provider credentials mirror the merchant cabinet settings; amount fields
/// are integer sum unless the name says tiyin.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,

    // Payme merchant
    pub payme_id: String,
    pub payme_key: String,
    pub payme_url: String,
    /// Key of the order id inside the JSON-RPC `account` object.
    pub payme_account_field: String,
    pub payme_min_amount: i64,

    // Click merchant
    pub click_service_id: String,
    pub click_merchant_id: String,
    pub click_secret_key: String,
    pub click_merchant_user_id: String,

    // Order lifecycle
    pub order_payment_timeout_minutes: i64,
    pub pickup_address: String,

    // Fiscalization fallbacks
    pub default_ikpu: String,
    pub default_package_code: String,

    /// Telegram bot token for outbound notifications; notifications are
    /// logged instead of delivered when absent.
    pub bot_token: Option<String>,

    /// Per-transaction `lock_timeout` on Postgres.
    pub lock_timeout_ms: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: parsed("BIND_ADDR", "0.0.0.0:8080")?,
            payme_id: required("PAYME_ID")?,
            payme_key: required("PAYME_KEY")?,
            payme_url: optional("PAYME_URL", "https://checkout.paycom.uz"),
            payme_account_field: optional("PAYME_ACCOUNT_FIELD", "order_id"),
            payme_min_amount: parsed("PAYME_MIN_AMOUNT", "100000")?,
            click_service_id: required("CLICK_SERVICE_ID")?,
            click_merchant_id: required("CLICK_MERCHANT_ID")?,
            click_secret_key: required("CLICK_SECRET_KEY")?,
            click_merchant_user_id: required("CLICK_MERCHANT_USER_ID")?,
            order_payment_timeout_minutes: parsed("ORDER_PAYMENT_TIMEOUT_MINUTES", "20")?,
            pickup_address: optional("PICKUP_ADDRESS", "Самовывоз: Чиланзар, 1"),
            default_ikpu: optional("DEFAULT_IKPU", "00702001001000001"),
            default_package_code: optional("DEFAULT_PACKAGE_CODE", "000000"),
            bot_token: env::var("BOT_TOKEN").ok().filter(|v| !v.is_empty()),
            lock_timeout_ms: parsed("LOCK_TIMEOUT_MS", "5000")?,
        })
    }

    /// Window during which an unpaid online order may still be paid.
    pub fn payment_timeout(&self) -> Duration {
        Duration::minutes(self.order_payment_timeout_minutes)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn optional(name: &'static str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = optional(name, default);
    raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_default_parses() {
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn missing_required_variable_is_reported() {
        env::remove_var("TEZSHOP_TEST_MISSING");
        let err = required("TEZSHOP_TEST_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TEZSHOP_TEST_MISSING")));
    }
}
