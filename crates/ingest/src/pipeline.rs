use std::sync::Arc;

use tracing::{debug, warn};

use {
    courier_channels::{
        AdapterRegistry, ChannelCredentials, DeliveryStatusUpdate, UnifiedInboundMessage,
    },
    courier_common::{ChannelKind, DeliveryStatus, Direction, EventBus, HubEvent},
    courier_store::{Conversation, ContactChannelLink, Inbox, Message, NewMessage, Store},
};

use crate::{conversation, resolver};

/// What a processed payload amounted to.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Payload carried nothing to act on; acknowledged with no side
    /// effects.
    Skipped(&'static str),
    /// A delivery receipt was applied to a previously sent message.
    StatusApplied { message_id: String },
    /// A contact message was ingested.
    Ingested {
        conversation_id: String,
        message_id: String,
        conversation_created: bool,
    },
}

/// Orchestrates adapter → resolver → conversation → persistence → events
/// for one inbound payload.
pub struct IngestPipeline {
    store: Store,
    adapters: Arc<AdapterRegistry>,
    bus: EventBus,
}

impl IngestPipeline {
    pub fn new(store: Store, adapters: Arc<AdapterRegistry>, bus: EventBus) -> Self {
        Self {
            store,
            adapters,
            bus,
        }
    }

    /// Process a payload delivered to a per-inbox webhook URL.
    pub async fn handle_inbound(
        &self,
        inbox_id: &str,
        raw: &serde_json::Value,
    ) -> anyhow::Result<IngestOutcome> {
        let Some(inbox) = self.store.inbox(inbox_id).await? else {
            // Stale webhook target (inbox deleted, or a guessed URL).
            warn!(inbox_id, "webhook for unknown inbox, dropping");
            return Ok(IngestOutcome::Skipped("unknown inbox"));
        };
        self.process(inbox, raw).await
    }

    /// Process a payload delivered to a generic (account-level) webhook,
    /// resolving the inbox from the routing key embedded in the payload.
    pub async fn handle_generic(
        &self,
        kind: ChannelKind,
        raw: &serde_json::Value,
    ) -> anyhow::Result<IngestOutcome> {
        let Some(adapter) = self.adapters.get(kind) else {
            warn!(channel = %kind, "no adapter registered");
            return Ok(IngestOutcome::Skipped("no adapter"));
        };
        let Some(routing_key) = adapter.extract_routing_key(raw) else {
            debug!(channel = %kind, "payload carries no routing key");
            return Ok(IngestOutcome::Skipped("no routing key"));
        };
        let Some(inbox) = self.store.find_inbox_by_routing_key(kind, &routing_key).await? else {
            warn!(channel = %kind, routing_key, "no inbox for routing key, dropping");
            return Ok(IngestOutcome::Skipped("unknown routing key"));
        };
        self.process(inbox, raw).await
    }

    async fn process(
        &self,
        inbox: Inbox,
        raw: &serde_json::Value,
    ) -> anyhow::Result<IngestOutcome> {
        if !inbox.is_active() {
            warn!(inbox_id = %inbox.id, status = %inbox.status, "inbox not active, dropping payload");
            return Ok(IngestOutcome::Skipped("inactive inbox"));
        }

        let Some(adapter) = self.adapters.get(inbox.channel_kind) else {
            warn!(channel = %inbox.channel_kind, "no adapter registered");
            return Ok(IngestOutcome::Skipped("no adapter"));
        };

        // The inbox's own account id feeds the adapter's echo filter. A
        // malformed credential blob only disables that filter here; the
        // dispatcher deals with it separately.
        let self_account_id = ChannelCredentials::from_value(inbox.channel_kind, &inbox.credentials)
            .and_then(|c| c.self_account_id().map(str::to_string));

        if let Some(message) = adapter.parse_inbound(raw, self_account_id.as_deref()) {
            self.ingest_message(&inbox, message).await
        } else if let Some(update) = adapter.parse_status_update(raw) {
            self.handle_status_update(update).await
        } else {
            debug!(inbox_id = %inbox.id, "unprocessable payload, acknowledged");
            Ok(IngestOutcome::Skipped("unprocessable payload"))
        }
    }

    async fn ingest_message(
        &self,
        inbox: &Inbox,
        unified: UnifiedInboundMessage,
    ) -> anyhow::Result<IngestOutcome> {
        let (link, _contact) = resolver::resolve_or_create(&self.store, inbox, &unified).await?;
        let (mut conv, created) = self.find_open_or_create(inbox, &link).await?;

        let message = self
            .store
            .create_message(NewMessage {
                conversation_id: conv.id.clone(),
                content: unified.content,
                content_type: unified.content_type,
                direction: Direction::Inbound,
                status: DeliveryStatus::Delivered,
                external_id: unified.external_id,
                dedup_token: None,
                raw_payload: Some(unified.raw),
            })
            .await?;

        conversation::apply_inbound(&mut conv, &message);
        self.store.update_conversation(&conv).await?;

        if created {
            self.bus.publish(HubEvent::ConversationCreated {
                tenant_id: conv.tenant_id.clone(),
                payload: conversation_payload(&conv),
            });
        } else {
            self.bus.publish(HubEvent::ConversationUpdated {
                tenant_id: conv.tenant_id.clone(),
                payload: conversation_payload(&conv),
            });
        }
        self.bus.publish(HubEvent::MessageCreated {
            tenant_id: conv.tenant_id.clone(),
            payload: message_payload(&conv, &message),
        });

        debug!(
            inbox_id = %inbox.id,
            conversation_id = %conv.id,
            message_id = %message.id,
            conversation_created = created,
            "ingested inbound message"
        );

        Ok(IngestOutcome::Ingested {
            conversation_id: conv.id,
            message_id: message.id,
            conversation_created: created,
        })
    }

    /// Find the open conversation for a link, or open a new one. The
    /// partial unique index on open conversations arbitrates concurrent
    /// creates; the loser adopts the winner's conversation.
    async fn find_open_or_create(
        &self,
        inbox: &Inbox,
        link: &ContactChannelLink,
    ) -> anyhow::Result<(Conversation, bool)> {
        if let Some(existing) = self.store.open_conversation_for_link(&link.id).await? {
            return Ok((existing, false));
        }

        match self
            .store
            .create_conversation(&inbox.tenant_id, &inbox.id, &link.id)
            .await
        {
            Ok(created) => Ok((created, true)),
            Err(e) if e.is_unique_violation() => {
                debug!(link_id = %link.id, "lost open-conversation race, re-reading");
                let existing = self
                    .store
                    .open_conversation_for_link(&link.id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("open conversation vanished after race"))?;
                Ok((existing, false))
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a provider delivery receipt to the message it refers to.
    ///
    /// A receipt for a message we never tracked is logged and dropped, not
    /// an error: providers redeliver receipts at least once and may refer
    /// to messages sent before the inbox was connected.
    pub async fn handle_status_update(
        &self,
        update: DeliveryStatusUpdate,
    ) -> anyhow::Result<IngestOutcome> {
        match self.store.message_by_external_id(&update.external_id).await? {
            Some(message) => {
                self.store
                    .update_message_status(&message.id, update.status)
                    .await?;
                debug!(message_id = %message.id, status = %update.status, "applied delivery status");
                Ok(IngestOutcome::StatusApplied {
                    message_id: message.id,
                })
            },
            None => {
                warn!(external_id = %update.external_id, "status update for untracked message, dropping");
                Ok(IngestOutcome::Skipped("untracked message"))
            },
        }
    }
}

fn conversation_payload(conv: &Conversation) -> serde_json::Value {
    serde_json::json!({
        "tenantId": conv.tenant_id,
        "conversationId": conv.id,
        "conversation": conv,
    })
}

fn message_payload(conv: &Conversation, message: &Message) -> serde_json::Value {
    serde_json::json!({
        "tenantId": conv.tenant_id,
        "conversationId": conv.id,
        "message": message,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_common::{ChannelKind, ConversationStatus},
        courier_store::NewInbox,
        courier_telegram::TelegramAdapter,
        courier_whatsapp::WhatsappAdapter,
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::init(&pool).await.unwrap();
        Store::new(pool)
    }

    fn registry() -> Arc<AdapterRegistry> {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(TelegramAdapter));
        registry.register(Box::new(WhatsappAdapter));
        Arc::new(registry)
    }

    fn telegram_update(text: &str) -> serde_json::Value {
        serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 42,
                "from": {"id": 9912, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 9912, "type": "private"},
                "text": text
            }
        })
    }

    async fn pipeline_with_inbox() -> (IngestPipeline, Store, EventBus, Inbox) {
        let store = test_store().await;
        let bus = EventBus::new(32);
        let inbox = store
            .create_inbox(NewInbox {
                tenant_id: "t1".into(),
                channel_kind: ChannelKind::Telegram,
                name: "Support bot".into(),
                credentials: serde_json::json!({"channel": "telegram", "bot_token": "x"}),
                routing_key: None,
            })
            .await
            .unwrap();
        let pipeline = IngestPipeline::new(store.clone(), registry(), bus.clone());
        (pipeline, store, bus, inbox)
    }

    #[tokio::test]
    async fn first_message_creates_everything_and_emits_events() {
        let (pipeline, store, bus, inbox) = pipeline_with_inbox().await;
        let mut rx = bus.subscribe();

        let outcome = pipeline
            .handle_inbound(&inbox.id, &telegram_update("hello"))
            .await
            .unwrap();

        let IngestOutcome::Ingested {
            conversation_id,
            message_id,
            conversation_created,
        } = outcome
        else {
            panic!("expected ingest, got {outcome:?}");
        };
        assert!(conversation_created);

        let conv = store.conversation(&conversation_id).await.unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Open);
        assert_eq!(conv.unread_count, 1);
        assert_eq!(conv.last_message_content.as_deref(), Some("hello"));
        assert_eq!(conv.last_message_direction, Some(Direction::Inbound));

        let message = store.message(&message_id).await.unwrap().unwrap();
        assert_eq!(message.direction, Direction::Inbound);
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert!(message.raw_payload.is_some());

        match rx.recv().await.unwrap() {
            HubEvent::ConversationCreated { tenant_id, payload } => {
                assert_eq!(tenant_id, "t1");
                assert_eq!(payload["conversationId"], conversation_id.as_str());
            },
            other => panic!("expected conversation.created first, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            HubEvent::MessageCreated { payload, .. } => {
                assert_eq!(payload["message"]["id"], message_id.as_str());
            },
            other => panic!("expected message.created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replay_reuses_contact_and_conversation() {
        let (pipeline, store, _bus, inbox) = pipeline_with_inbox().await;
        let raw = telegram_update("hello again");

        let first = pipeline.handle_inbound(&inbox.id, &raw).await.unwrap();
        let second = pipeline.handle_inbound(&inbox.id, &raw).await.unwrap();

        let (IngestOutcome::Ingested {
            conversation_id: conv_a,
            conversation_created: created_a,
            ..
        }, IngestOutcome::Ingested {
            conversation_id: conv_b,
            conversation_created: created_b,
            ..
        }) = (first, second)
        else {
            panic!("expected two ingests");
        };

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(conv_a, conv_b);

        let conv = store.conversation(&conv_a).await.unwrap().unwrap();
        assert_eq!(conv.unread_count, 2);

        // One link, one contact, regardless of replay.
        let link = store.link_by_source(&inbox.id, "9912").await.unwrap();
        assert!(link.is_some());
    }

    #[tokio::test]
    async fn resolved_conversation_reopens_on_inbound() {
        let (pipeline, store, _bus, inbox) = pipeline_with_inbox().await;

        let outcome = pipeline
            .handle_inbound(&inbox.id, &telegram_update("first"))
            .await
            .unwrap();
        let IngestOutcome::Ingested { conversation_id, .. } = outcome else {
            panic!("expected ingest");
        };

        let mut conv = store.conversation(&conversation_id).await.unwrap().unwrap();
        conv.status = ConversationStatus::Resolved;
        store.update_conversation(&conv).await.unwrap();

        // Resolving freed the open-conversation slot, so the reply starts
        // a fresh thread instead of reviving the resolved one.
        let outcome = pipeline
            .handle_inbound(&inbox.id, &telegram_update("back again"))
            .await
            .unwrap();
        let IngestOutcome::Ingested {
            conversation_id: new_conv,
            conversation_created,
            ..
        } = outcome
        else {
            panic!("expected ingest");
        };
        assert!(conversation_created);
        assert_ne!(new_conv, conversation_id);
        let conv = store.conversation(&new_conv).await.unwrap().unwrap();
        assert_eq!(conv.status, ConversationStatus::Open);
    }

    #[tokio::test]
    async fn unknown_inbox_is_skipped() {
        let (pipeline, _store, _bus, _inbox) = pipeline_with_inbox().await;
        let outcome = pipeline
            .handle_inbound("nope", &telegram_update("hi"))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped("unknown inbox"));
    }

    #[tokio::test]
    async fn unprocessable_payload_has_no_side_effects() {
        let (pipeline, store, _bus, inbox) = pipeline_with_inbox().await;
        let outcome = pipeline
            .handle_inbound(&inbox.id, &serde_json::json!({"update_id": 2}))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped("unprocessable payload"));
        assert!(store.link_by_source(&inbox.id, "9912").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn whatsapp_status_update_via_generic_route() {
        let store = test_store().await;
        let bus = EventBus::new(8);
        store
            .create_inbox(NewInbox {
                tenant_id: "t1".into(),
                channel_kind: ChannelKind::Whatsapp,
                name: "WA".into(),
                credentials: serde_json::json!({
                    "channel": "whatsapp",
                    "phone_number_id": "106540352242922",
                    "access_token": "EAAG",
                    "verify_token": "vt"
                }),
                routing_key: Some("106540352242922".into()),
            })
            .await
            .unwrap();
        let pipeline = IngestPipeline::new(store.clone(), registry(), bus);

        let sent = store
            .create_message(NewMessage {
                conversation_id: "c1".into(),
                content: "out".into(),
                content_type: courier_common::ContentType::Text,
                direction: Direction::Outbound,
                status: DeliveryStatus::Sent,
                external_id: Some("wamid.OUT1".into()),
                dedup_token: None,
                raw_payload: None,
            })
            .await
            .unwrap();

        let receipt = serde_json::json!({
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "metadata": {"phone_number_id": "106540352242922"},
                        "statuses": [{"id": "wamid.OUT1", "status": "read"}]
                    }
                }]
            }]
        });

        let outcome = pipeline
            .handle_generic(ChannelKind::Whatsapp, &receipt)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::StatusApplied {
                message_id: sent.id.clone()
            }
        );
        let reloaded = store.message(&sent.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, DeliveryStatus::Read);
    }

    #[tokio::test]
    async fn untracked_receipt_is_dropped() {
        let (pipeline, _store, _bus, _inbox) = pipeline_with_inbox().await;
        let outcome = pipeline
            .handle_status_update(DeliveryStatusUpdate {
                external_id: "wamid.GONE".into(),
                status: DeliveryStatus::Delivered,
            })
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped("untracked message"));
    }

    #[tokio::test]
    async fn inactive_inbox_drops_payload() {
        let (pipeline, store, _bus, inbox) = pipeline_with_inbox().await;
        store
            .set_inbox_status(&inbox.id, "disconnected")
            .await
            .unwrap();

        let outcome = pipeline
            .handle_inbound(&inbox.id, &telegram_update("hi"))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped("inactive inbox"));
    }
}
