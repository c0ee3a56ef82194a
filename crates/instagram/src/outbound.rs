use {secrecy::ExposeSecret, tracing::debug};

use courier_channels::{Error, InstagramCredentials, Result};

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com/v19.0";

/// Outbound sender for graph messaging.
///
/// Auth rides as a query parameter, as the graph messaging endpoint
/// expects, rather than a bearer header.
pub struct InstagramSender {
    client: reqwest::Client,
    graph_base: String,
}

impl InstagramSender {
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

    /// Send a text message; returns the provider message id.
    pub async fn send_text(
        &self,
        creds: &InstagramCredentials,
        recipient_id: &str,
        text: &str,
    ) -> Result<String> {
        let url = format!("{}/me/messages", self.graph_base);

        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", creds.access_token.expose_secret())])
            .json(&serde_json::json!({
                "recipient": {"id": recipient_id},
                "message": {"text": text},
            }))
            .send()
            .await
            .map_err(|e| Error::api("instagram", 0, e.to_string()))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::api("instagram", status.as_u16(), e.to_string()))?;

        if !status.is_success() {
            return Err(Error::api("instagram", status.as_u16(), body.to_string()));
        }

        let message_id = body
            .get("message_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::api("instagram", status.as_u16(), "missing message_id"))?;

        debug!(recipient_id, message_id, "instagram send ok");
        Ok(message_id.to_string())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {secrecy::Secret, super::*};

    fn creds() -> InstagramCredentials {
        InstagramCredentials {
            account_id: "17841400008460056".into(),
            access_token: Secret::new("IGQtoken".into()),
            verify_token: "vt".into(),
        }
    }

    #[tokio::test]
    async fn send_returns_message_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/me/messages")
            .match_query(mockito::Matcher::UrlEncoded(
                "access_token".into(),
                "IGQtoken".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"recipient_id":"6017533191","message_id":"aWdfOUT7"}"#)
            .create_async()
            .await;

        let sender = InstagramSender::new(reqwest::Client::new()).with_graph_base(server.url());
        let id = sender.send_text(&creds(), "6017533191", "hi").await.unwrap();
        assert_eq!(id, "aWdfOUT7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/me/messages")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Invalid user id"}}"#)
            .create_async()
            .await;

        let sender = InstagramSender::new(reqwest::Client::new()).with_graph_base(server.url());
        let err = sender
            .send_text(&creds(), "nope", "hi")
            .await
            .unwrap_err();
        match err {
            Error::Api { status, .. } => assert_eq!(status, 400),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
