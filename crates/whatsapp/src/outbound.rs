use {
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use courier_channels::{Error, Result, WhatsappCredentials};

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

/// Refresh look-ahead window: tokens expiring within 10 days are refreshed
/// before use.
pub const REFRESH_LOOKAHEAD_SECS: i64 = 10 * 24 * 60 * 60;

/// A refreshed access token with its new absolute expiry.
#[derive(Clone)]
pub struct RefreshedToken {
    pub access_token: Secret<String>,
    pub expires_at: Option<i64>,
}

/// Outbound sender for the Cloud API.
pub struct WhatsappSender {
    client: reqwest::Client,
    graph_base: String,
}

impl WhatsappSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            graph_base: DEFAULT_GRAPH_BASE.into(),
        }
    }

    /// Override the graph API base URL (tests).
    pub fn with_graph_base(mut self, base: impl Into<String>) -> Self {
        self.graph_base = base.into();
        self
    }

    /// Send a text message; returns the provider message id (`wamid…`).
    pub async fn send_text(
        &self,
        creds: &WhatsappCredentials,
        to: &str,
        text: &str,
    ) -> Result<String> {
        let url = format!("{}/{}/messages", self.graph_base, creds.phone_number_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(creds.access_token.expose_secret())
            .json(&serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "text",
                "text": {"body": text},
            }))
            .send()
            .await
            .map_err(|e| Error::api("whatsapp", 0, e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::api("whatsapp", status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::api("whatsapp", status.as_u16(), body.to_string()));
        }

        let message_id = body
            .get("messages")
            .and_then(|m| m.as_array())
            .and_then(|m| m.first())
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::api("whatsapp", status.as_u16(), "missing messages[0].id"))?;

        debug!(to, message_id, "whatsapp send ok");
        Ok(message_id.to_string())
    }

    /// Exchange the current token for a fresh long-lived one.
    ///
    /// `expires_in` from the response is converted to an absolute unix
    /// timestamp so the stored credential can be checked against the
    /// refresh window without remembering when it was issued.
    pub async fn refresh_token(&self, creds: &WhatsappCredentials) -> Result<RefreshedToken> {
        let url = format!("{}/oauth/access_token", self.graph_base);

        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "fb_exchange_token"),
                ("fb_exchange_token", creds.access_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| Error::api("whatsapp", 0, e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::api("whatsapp", status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::api("whatsapp", status.as_u16(), body.to_string()));
        }

        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::api("whatsapp", status.as_u16(), "missing access_token"))?;

        let expires_at = body
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .map(|secs| courier_common::now_unix() + secs);

        Ok(RefreshedToken {
            access_token: Secret::new(access_token.to_string()),
            expires_at,
        })
    }
}

/// Whether a stored expiry falls within the refresh look-ahead window.
///
/// Credentials without a recorded expiry are never refreshed lazily.
pub fn needs_refresh(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.is_some_and(|exp| exp - now <= REFRESH_LOOKAHEAD_SECS)
}
