//! Telegram Bot API notification sink.
//!
//! The bot conversation itself lives elsewhere; this sink only pushes
//! payment status messages through `sendMessage`.

use async_trait::async_trait;
use serde_json::json;

use tezshop_core::notify::{Notification, NotifyError, NotifySink};

pub struct TelegramSink {
    http: reqwest::Client,
    token: String,
}

impl TelegramSink {
    pub fn new(token: String) -> Self {
        Self { http: reqwest::Client::new(), token }
    }
}

#[async_trait]
impl NotifySink for TelegramSink {
    async fn deliver(&self, note: &Notification) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": note.telegram_id,
                "text": note.text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("telegram api {status}: {body}")));
        }
        Ok(())
    }
}
