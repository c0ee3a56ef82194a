//! Outbound dispatcher.
//!
//! Listens for queued operator messages on the bus and pushes each one to
//! its channel's provider API. Delivery is best-effort: any failure lands
//! the message in status `failed` rather than crashing the loop, and a
//! crash between persist and dispatch simply leaves the message `sending`
//! until an operator retries.

use std::sync::Arc;

use tracing::{debug, warn};

use {
    courier_channels::ChannelCredentials,
    courier_common::{now_unix, DeliveryStatus, Direction, EventBus, HubEvent},
    courier_config::ChannelEndpoints,
    courier_instagram::InstagramSender,
    courier_store::{Message, Store},
    courier_telegram::TelegramSender,
    courier_whatsapp::{needs_refresh, WhatsappSender},
};

/// Why a queued message was not handed to a provider.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent; carries the provider message id now recorded on the row.
    Sent { external_id: String },
    /// Already picked up by another dispatch, or not in `sending`.
    AlreadyHandled,
    /// Terminal failure, message marked `failed`.
    Failed,
}

/// Cap on any single provider call, refresh included.
const SEND_TIMEOUT_SECS: u64 = 30;

pub struct Dispatcher {
    store: Store,
    bus: EventBus,
    telegram: TelegramSender,
    whatsapp: WhatsappSender,
    instagram: InstagramSender,
}

impl Dispatcher {
    pub fn new(store: Store, bus: EventBus, endpoints: &ChannelEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            store,
            bus,
            telegram: TelegramSender::new(client.clone())
                .with_api_base(endpoints.telegram_api_base.clone()),
            whatsapp: WhatsappSender::new(client.clone())
                .with_graph_base(endpoints.graph_api_base.clone()),
            instagram: InstagramSender::new(client)
                .with_graph_base(endpoints.graph_api_base.clone()),
        }
    }

    /// Run the dispatch loop until the bus closes. Each queued message is
    /// dispatched on its own task so one slow provider does not hold up
    /// the rest.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(HubEvent::MessageQueued { message_id, .. }) => {
                        let dispatcher = Arc::clone(&self);
                        tokio::spawn(async move {
                            dispatcher.dispatch(&message_id).await;
                        });
                    },
                    Ok(_) => {},
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // Lagged queued messages stay `sending`; operators
                        // see the stuck status and retry.
                        warn!(missed, "dispatcher lagged behind the bus");
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("dispatch loop stopped");
        })
    }

    /// Dispatch one queued message. Failures are recorded on the row, not
    /// propagated.
    pub async fn dispatch(&self, message_id: &str) -> DispatchOutcome {
        match self.try_dispatch(message_id).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(message_id, %error, "dispatch failed, marking message failed");
                if let Err(e) = self
                    .store
                    .update_message_status(message_id, DeliveryStatus::Failed)
                    .await
                {
                    warn!(message_id, error = %e, "could not record failed status");
                }
                DispatchOutcome::Failed
            },
        }
    }

    async fn try_dispatch(&self, message_id: &str) -> anyhow::Result<DispatchOutcome> {
        let Some(message) = self.store.message(message_id).await? else {
            warn!(message_id, "queued message vanished before dispatch");
            return Ok(DispatchOutcome::AlreadyHandled);
        };
        if message.direction != Direction::Outbound
            || message.status != DeliveryStatus::Sending
        {
            debug!(message_id, status = %message.status, "message not awaiting dispatch, skipping");
            return Ok(DispatchOutcome::AlreadyHandled);
        }

        let conv = self
            .store
            .conversation(&message.conversation_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("message {message_id} has no conversation"))?;
        let link = self
            .store
            .link(&conv.link_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation {} has no link", conv.id))?;
        let inbox = self
            .store
            .inbox(&conv.inbox_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("conversation {} has no inbox", conv.id))?;

        // A blob that does not decode for its channel fails the message
        // before any network traffic.
        let Some(creds) = ChannelCredentials::from_value(inbox.channel_kind, &inbox.credentials)
        else {
            anyhow::bail!(
                "inbox {} has malformed credentials for channel {}",
                inbox.id,
                inbox.channel_kind
            );
        };

        let external_id = self
            .send(&inbox.id, creds, &link.source_id, &message)
            .await?;

        self.store
            .set_message_external_id(&message.id, &external_id)
            .await?;
        self.store
            .update_message_status(&message.id, DeliveryStatus::Sent)
            .await?;
        debug!(message_id, external_id, channel = %inbox.channel_kind, "dispatched");

        Ok(DispatchOutcome::Sent { external_id })
    }

    async fn send(
        &self,
        inbox_id: &str,
        creds: ChannelCredentials,
        destination: &str,
        message: &Message,
    ) -> anyhow::Result<String> {
        let external_id = match creds {
            ChannelCredentials::Telegram(c) => {
                self.telegram
                    .send_text(&c, destination, &message.content)
                    .await?
            },
            ChannelCredentials::Whatsapp(mut c) => {
                if needs_refresh(c.expires_at, now_unix()) {
                    // Refresh failure is not fatal: the current token may
                    // still have days of validity left.
                    match self.whatsapp.refresh_token(&c).await {
                        Ok(refreshed) => {
                            c.access_token = refreshed.access_token;
                            c.expires_at = refreshed.expires_at;
                            let blob =
                                serde_json::to_value(ChannelCredentials::Whatsapp(c.clone()))?;
                            self.store.update_inbox_credentials(inbox_id, &blob).await?;
                            debug!(inbox_id, "refreshed whatsapp access token");
                        },
                        Err(error) => {
                            warn!(inbox_id, %error, "token refresh failed, sending with current token");
                        },
                    }
                }
                self.whatsapp
                    .send_text(&c, destination, &message.content)
                    .await?
            },
            ChannelCredentials::Instagram(c) => {
                self.instagram
                    .send_text(&c, destination, &message.content)
                    .await?
            },
        };
        Ok(external_id)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_common::{ChannelKind, ContentType},
        courier_store::{NewInbox, NewMessage},
        sqlx::sqlite::SqlitePoolOptions,
    };

    struct Fixture {
        store: Store,
        dispatcher: Dispatcher,
        message_id: String,
        inbox_id: String,
    }

    async fn fixture(
        kind: ChannelKind,
        credentials: serde_json::Value,
        server_url: &str,
    ) -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::init(&pool).await.unwrap();
        let store = Store::new(pool);

        let inbox = store
            .create_inbox(NewInbox {
                tenant_id: "t1".into(),
                channel_kind: kind,
                name: "test".into(),
                credentials,
                routing_key: None,
            })
            .await
            .unwrap();
        let contact = store
            .create_contact("t1", "Ada", Some("+60175331"), None)
            .await
            .unwrap();
        let link = store
            .create_link(&inbox.id, &contact.id, "60175331", Some("Ada"))
            .await
            .unwrap();
        let conv = store
            .create_conversation("t1", &inbox.id, &link.id)
            .await
            .unwrap();
        let message = store
            .create_message(NewMessage {
                conversation_id: conv.id,
                content: "on our way".into(),
                content_type: ContentType::Text,
                direction: Direction::Outbound,
                status: DeliveryStatus::Sending,
                external_id: None,
                dedup_token: None,
                raw_payload: None,
            })
            .await
            .unwrap();

        let endpoints = ChannelEndpoints {
            telegram_api_base: server_url.into(),
            graph_api_base: server_url.into(),
            app_verify_token: None,
        };
        let dispatcher = Dispatcher::new(store.clone(), EventBus::new(8), &endpoints);
        Fixture {
            store,
            dispatcher,
            message_id: message.id,
            inbox_id: inbox.id,
        }
    }

    #[tokio::test]
    async fn telegram_send_records_external_id_and_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"message_id": 814}}"#)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Telegram,
            serde_json::json!({"channel": "telegram", "bot_token": "123:ABC"}),
            &server.url(),
        )
        .await;

        let outcome = f.dispatcher.dispatch(&f.message_id).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                external_id: "814".into()
            }
        );
        mock.assert_async().await;

        let message = f.store.message(&f.message_id).await.unwrap().unwrap();
        assert_eq!(message.status, DeliveryStatus::Sent);
        assert_eq!(message.external_id.as_deref(), Some("814"));
    }

    #[tokio::test]
    async fn provider_error_marks_message_failed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:ABC/sendMessage")
            .with_status(403)
            .with_body(r#"{"ok": false, "description": "bot was blocked by the user"}"#)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Telegram,
            serde_json::json!({"channel": "telegram", "bot_token": "123:ABC"}),
            &server.url(),
        )
        .await;

        assert_eq!(
            f.dispatcher.dispatch(&f.message_id).await,
            DispatchOutcome::Failed
        );
        let message = f.store.message(&f.message_id).await.unwrap().unwrap();
        assert_eq!(message.status, DeliveryStatus::Failed);
        assert!(message.external_id.is_none());
    }

    #[tokio::test]
    async fn malformed_credentials_fail_without_network() {
        let mut server = mockito::Server::new_async().await;
        let never = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Telegram,
            serde_json::json!({"channel": "telegram"}),
            &server.url(),
        )
        .await;

        assert_eq!(
            f.dispatcher.dispatch(&f.message_id).await,
            DispatchOutcome::Failed
        );
        never.assert_async().await;
        let message = f.store.message(&f.message_id).await.unwrap().unwrap();
        assert_eq!(message.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn stale_whatsapp_token_refreshes_before_send() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/oauth/access_token")
            .with_status(200)
            .with_body(r#"{"access_token": "EAAG_NEW", "expires_in": 5184000}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/1065403/messages")
            .match_header("authorization", "Bearer EAAG_NEW")
            .with_status(200)
            .with_body(r#"{"messages": [{"id": "wamid.NEW1"}]}"#)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Whatsapp,
            serde_json::json!({
                "channel": "whatsapp",
                "phone_number_id": "1065403",
                "access_token": "EAAG_OLD",
                "verify_token": "vt",
                "expires_at": now_unix() + 3600
            }),
            &server.url(),
        )
        .await;

        let outcome = f.dispatcher.dispatch(&f.message_id).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                external_id: "wamid.NEW1".into()
            }
        );
        refresh.assert_async().await;
        send.assert_async().await;

        // The refreshed token was persisted for the next send.
        let inbox = f.store.inbox(&f.inbox_id).await.unwrap().unwrap();
        assert_eq!(inbox.credentials["access_token"], "EAAG_NEW");
        assert!(inbox.credentials["expires_at"].as_i64().unwrap() > now_unix() + 5_000_000);
    }

    #[tokio::test]
    async fn failed_refresh_still_sends_with_current_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/access_token")
            .with_status(400)
            .with_body(r#"{"error": {"message": "invalid token"}}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/1065403/messages")
            .match_header("authorization", "Bearer EAAG_OLD")
            .with_status(200)
            .with_body(r#"{"messages": [{"id": "wamid.OK"}]}"#)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Whatsapp,
            serde_json::json!({
                "channel": "whatsapp",
                "phone_number_id": "1065403",
                "access_token": "EAAG_OLD",
                "verify_token": "vt",
                "expires_at": now_unix() + 3600
            }),
            &server.url(),
        )
        .await;

        let outcome = f.dispatcher.dispatch(&f.message_id).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                external_id: "wamid.OK".into()
            }
        );
        send.assert_async().await;
    }

    #[tokio::test]
    async fn already_sent_message_is_not_redispatched() {
        let mut server = mockito::Server::new_async().await;
        let never = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let f = fixture(
            ChannelKind::Telegram,
            serde_json::json!({"channel": "telegram", "bot_token": "123:ABC"}),
            &server.url(),
        )
        .await;
        f.store
            .update_message_status(&f.message_id, DeliveryStatus::Sent)
            .await
            .unwrap();

        assert_eq!(
            f.dispatcher.dispatch(&f.message_id).await,
            DispatchOutcome::AlreadyHandled
        );
        never.assert_async().await;
    }
}
