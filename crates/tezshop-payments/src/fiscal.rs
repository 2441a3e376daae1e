//! Receipt submission to Click's OFD endpoint.
//!
//! Fiscal dispatch happens after the payment has committed; a failure here
//! is an operational problem, never a payment problem, so the dispatcher
//! logs and swallows every error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sha1::{Digest, Sha1};
use tracing::{error, info};

use tezshop_core::Settings;

const OFD_SUBMIT_URL: &str = "https://api.click.uz/v2/merchant/payment/ofd_data/submit_items";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FiscalItem {
    /// IKPU tax catalogue code.
    pub spic: String,
    pub title: String,
    pub package_code: String,
    /// Tiyin.
    pub price: i64,
    /// Quantity.
    pub amount: i32,
    pub units: i64,
    pub vat_percent: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FiscalReceipt {
    pub service_id: i64,
    /// Tiyin paid electronically in this payment.
    pub received_ecash: i64,
    pub items: Vec<FiscalItem>,
}

#[async_trait]
pub trait FiscalDispatcher: Send + Sync {
    /// Submits the receipt for a captured payment. `payment_id` is the id
    /// in the Click system, not ours.
    async fn submit_items(&self, payment_id: i64, receipt: FiscalReceipt);
}

/// No-op dispatcher for tests and for merchants without fiscalization.
pub struct NullFiscal;

#[async_trait]
impl FiscalDispatcher for NullFiscal {
    async fn submit_items(&self, _payment_id: i64, _receipt: FiscalReceipt) {}
}

#[derive(Serialize)]
struct SubmitItemsPayload {
    service_id: i64,
    payment_id: i64,
    items: Vec<FiscalItem>,
    received_ecash: i64,
    received_cash: i64,
    received_card: i64,
}

pub struct ClickFiscalClient {
    http: reqwest::Client,
    settings: Arc<Settings>,
}

impl ClickFiscalClient {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { http: reqwest::Client::new(), settings }
    }

    /// `Auth: <merchant_user_id>:<sha1(timestamp ++ secret)>:<timestamp>`.
    fn auth_header(&self) -> String {
        let timestamp = Utc::now().timestamp();
        let digest = hex::encode(Sha1::digest(
            format!("{timestamp}{}", self.settings.click_secret_key).as_bytes(),
        ));
        format!("{}:{}:{}", self.settings.click_merchant_user_id, digest, timestamp)
    }
}

#[async_trait]
impl FiscalDispatcher for ClickFiscalClient {
    async fn submit_items(&self, payment_id: i64, receipt: FiscalReceipt) {
        let payload = SubmitItemsPayload {
            service_id: receipt.service_id,
            payment_id,
            items: receipt.items,
            received_ecash: receipt.received_ecash,
            received_cash: 0,
            received_card: 0,
        };

        let request = self
            .http
            .post(OFD_SUBMIT_URL)
            .header("Accept", "application/json")
            .header("Auth", self.auth_header())
            .json(&payload);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(payment_id, "fiscal data submitted");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(payment_id, %status, body, "fiscal submission rejected");
            }
            Err(err) => {
                error!(payment_id, %err, "fiscal submission request failed");
            }
        }
    }
}
