use {secrecy::ExposeSecret, tracing::debug};

use courier_channels::{Error, Result, TelegramCredentials};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Outbound sender for the bot API.
///
/// The bot token travels in the URL path, as the API requires.
pub struct TelegramSender {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    /// Override the API base URL (tests, self-hosted bot API servers).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Send a text message; returns the provider message id.
    pub async fn send_text(
        &self,
        creds: &TelegramCredentials,
        chat_id: &str,
        text: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            creds.bot_token.expose_secret()
        );

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({"chat_id": chat_id, "text": text}))
            .send()
            .await
            .map_err(|e| Error::api("telegram", 0, e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::api("telegram", status.as_u16(), e.to_string()))?;

        if !status.is_success() || body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(Error::api("telegram", status.as_u16(), body.to_string()));
        }

        let message_id = body
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                Error::api("telegram", status.as_u16(), "missing result.message_id")
            })?;

        debug!(chat_id, message_id, "telegram send ok");
        Ok(message_id.to_string())
    }
}
