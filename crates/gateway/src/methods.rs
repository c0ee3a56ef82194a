//! RPC methods callable over an authenticated WebSocket connection.

use std::sync::Arc;

use {
    serde::Deserialize,
    tracing::{debug, warn},
};

use {
    courier_common::{ContentType, DeliveryStatus, Direction, HubEvent},
    courier_ingest::conversation,
    courier_protocol::{error_codes, ErrorShape, RequestFrame, ResponseFrame},
    courier_store::NewMessage,
};

use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSendParams {
    conversation_id: String,
    content: String,
    #[serde(default)]
    content_type: Option<ContentType>,
    /// Client-chosen idempotency key; a retry with the same token returns
    /// the original message instead of sending twice.
    #[serde(default)]
    dedup_token: Option<String>,
}

/// Dispatch one request frame from an authenticated connection.
pub async fn dispatch(
    state: &Arc<GatewayState>,
    tenant_id: &str,
    req: RequestFrame,
) -> ResponseFrame {
    match req.method.as_str() {
        "message.send" => message_send(state, tenant_id, req).await,
        "connect" => ResponseFrame::err(
            req.id,
            ErrorShape::new(error_codes::INVALID_REQUEST, "already connected"),
        ),
        other => ResponseFrame::err(
            req.id,
            ErrorShape::new(
                error_codes::INVALID_REQUEST,
                format!("unknown method '{other}'"),
            ),
        ),
    }
}

/// Persist an operator message, update the conversation, and hand the
/// message to the outbound dispatcher via the bus. The response reports
/// status `sending`; delivery progress arrives as receipts later.
async fn message_send(
    state: &Arc<GatewayState>,
    tenant_id: &str,
    req: RequestFrame,
) -> ResponseFrame {
    let params: MessageSendParams =
        match serde_json::from_value(req.params.unwrap_or(serde_json::Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                return ResponseFrame::err(
                    req.id,
                    ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
                );
            },
        };
    if params.content.is_empty() {
        return ResponseFrame::err(
            req.id,
            ErrorShape::new(error_codes::INVALID_REQUEST, "content must not be empty"),
        );
    }

    let conv = match state.store.conversation(&params.conversation_id).await {
        // Tenant ownership check; a foreign conversation id reads as absent.
        Ok(Some(c)) if c.tenant_id == tenant_id => c,
        Ok(_) => {
            return ResponseFrame::err(
                req.id,
                ErrorShape::new(error_codes::NOT_FOUND, "conversation not found"),
            );
        },
        Err(e) => {
            warn!(error = %e, "conversation lookup failed");
            return ResponseFrame::err(
                req.id,
                ErrorShape::new(error_codes::UNAVAILABLE, "storage error"),
            );
        },
    };

    let mut conv = conv;
    let dedup_token = params.dedup_token.clone();
    let created = state
        .store
        .create_message(NewMessage {
            conversation_id: conv.id.clone(),
            content: params.content,
            content_type: params.content_type.unwrap_or(ContentType::Text),
            direction: Direction::Outbound,
            status: DeliveryStatus::Sending,
            external_id: None,
            dedup_token: params.dedup_token,
            raw_payload: None,
        })
        .await;

    let message = match created {
        Ok(m) => m,
        Err(e) if e.is_unique_violation() => {
            // Duplicate dedup token: the earlier send already went through,
            // so answer with it instead of sending twice.
            let original = dedup_token
                .as_deref()
                .map(|t| state.store.message_by_dedup_token(&conv.id, t));
            return match original {
                Some(lookup) => match lookup.await {
                    Ok(Some(m)) => ResponseFrame::ok(
                        req.id,
                        serde_json::json!({"messageId": m.id, "message": m, "duplicate": true}),
                    ),
                    _ => ResponseFrame::err(
                        req.id,
                        ErrorShape::new(error_codes::UNAVAILABLE, "storage error"),
                    ),
                },
                None => ResponseFrame::err(
                    req.id,
                    ErrorShape::new(error_codes::UNAVAILABLE, "storage error"),
                ),
            };
        },
        Err(e) => {
            warn!(error = %e, "message insert failed");
            return ResponseFrame::err(
                req.id,
                ErrorShape::new(error_codes::UNAVAILABLE, "storage error"),
            );
        },
    };

    let prior_status = conv.status;
    conversation::apply_outbound(&mut conv, &message);
    if let Err(e) = state.store.update_conversation(&conv).await {
        if e.is_unique_violation() {
            // The link already has another open conversation, so the reopen
            // loses: the reply stays on this thread in its prior status.
            conv.status = prior_status;
            if let Err(e) = state.store.update_conversation(&conv).await {
                warn!(error = %e, conversation_id = %conv.id, "conversation update failed after send");
            }
        } else {
            warn!(error = %e, conversation_id = %conv.id, "conversation update failed after send");
        }
    }

    state.bus.publish(HubEvent::ConversationUpdated {
        tenant_id: conv.tenant_id.clone(),
        payload: serde_json::json!({
            "tenantId": conv.tenant_id,
            "conversationId": conv.id,
            "conversation": conv,
        }),
    });
    state.bus.publish(HubEvent::MessageCreated {
        tenant_id: conv.tenant_id.clone(),
        payload: serde_json::json!({
            "tenantId": conv.tenant_id,
            "conversationId": conv.id,
            "message": message,
        }),
    });
    state.bus.publish(HubEvent::MessageQueued {
        tenant_id: conv.tenant_id.clone(),
        message_id: message.id.clone(),
    });

    debug!(conversation_id = %conv.id, message_id = %message.id, "operator message queued");
    ResponseFrame::ok(
        req.id,
        serde_json::json!({"messageId": message.id, "message": message}),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::StaticTokenAuth, state::GatewayState},
        courier_channels::AdapterRegistry,
        courier_common::{ChannelKind, ConversationStatus, EventBus},
        courier_config::ChannelEndpoints,
        courier_ingest::{IngestPipeline, IngestQueue},
        courier_store::{Conversation, NewInbox, Store},
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn state() -> Arc<GatewayState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::init(&pool).await.unwrap();
        let store = Store::new(pool);
        let bus = EventBus::new(16);
        let pipeline = Arc::new(IngestPipeline::new(
            store.clone(),
            Arc::new(AdapterRegistry::new()),
            bus.clone(),
        ));
        Arc::new(GatewayState::new(
            store,
            bus,
            IngestQueue::start(pipeline, 1, 4),
            Arc::new(AdapterRegistry::new()),
            Arc::new(StaticTokenAuth::new(Vec::new())),
            ChannelEndpoints::default(),
        ))
    }

    async fn seed_conversation(state: &Arc<GatewayState>) -> Conversation {
        let inbox = state
            .store
            .create_inbox(NewInbox {
                tenant_id: "acme".into(),
                channel_kind: ChannelKind::Telegram,
                name: "support".into(),
                credentials: serde_json::json!({"channel": "telegram", "bot_token": "123:ABC"}),
                routing_key: None,
            })
            .await
            .unwrap();
        let contact = state
            .store
            .create_contact("acme", "Ada", None, Some("ada"))
            .await
            .unwrap();
        let link = state
            .store
            .create_link(&inbox.id, &contact.id, "777", Some("Ada"))
            .await
            .unwrap();
        state
            .store
            .create_conversation("acme", &inbox.id, &link.id)
            .await
            .unwrap()
    }

    async fn resolve(state: &Arc<GatewayState>, conv: &Conversation) {
        let mut resolved = conv.clone();
        resolved.status = ConversationStatus::Resolved;
        state.store.update_conversation(&resolved).await.unwrap();
    }

    fn send_request(id: &str, params: serde_json::Value) -> RequestFrame {
        RequestFrame {
            r#type: "req".into(),
            id: id.into(),
            method: "message.send".into(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn reply_reopens_resolved_conversation() {
        let state = state().await;
        let conv = seed_conversation(&state).await;
        resolve(&state, &conv).await;

        let resp = dispatch(
            &state,
            "acme",
            send_request(
                "1",
                serde_json::json!({"conversationId": conv.id, "content": "back with you"}),
            ),
        )
        .await;
        assert!(resp.ok);

        let stored = state.store.conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Open);
        assert_eq!(stored.unread_count, 0);
        assert_eq!(stored.last_message_content.as_deref(), Some("back with you"));
    }

    #[tokio::test]
    async fn reopen_yields_when_link_has_another_open_conversation() {
        let state = state().await;
        let conv = seed_conversation(&state).await;
        resolve(&state, &conv).await;
        // Inbound after resolve starts a fresh thread on the same link;
        // it now holds the link's open slot.
        let newer = state
            .store
            .create_conversation("acme", &conv.inbox_id, &conv.link_id)
            .await
            .unwrap();

        let mut events = state.bus.subscribe();
        let resp = dispatch(
            &state,
            "acme",
            send_request(
                "1",
                serde_json::json!({"conversationId": conv.id, "content": "closing note"}),
            ),
        )
        .await;
        assert!(resp.ok);

        // The reply stays on the resolved thread instead of reopening it.
        let stored = state.store.conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversationStatus::Resolved);
        assert_eq!(stored.last_message_content.as_deref(), Some("closing note"));
        let open = state.store.conversation(&newer.id).await.unwrap().unwrap();
        assert_eq!(open.status, ConversationStatus::Open);

        // Clients see the state that was actually persisted.
        match events.recv().await.unwrap() {
            HubEvent::ConversationUpdated { payload, .. } => {
                assert_eq!(payload["conversation"]["status"], "resolved");
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_dedup_token_answers_with_the_original() {
        let state = state().await;
        let conv = seed_conversation(&state).await;

        let first = dispatch(
            &state,
            "acme",
            send_request(
                "1",
                serde_json::json!({
                    "conversationId": conv.id,
                    "content": "hello",
                    "dedupToken": "req-42"
                }),
            ),
        )
        .await;
        assert!(first.ok);
        let first_id = first.payload.unwrap()["messageId"]
            .as_str()
            .unwrap()
            .to_string();

        let mut events = state.bus.subscribe();
        let retry = dispatch(
            &state,
            "acme",
            send_request(
                "2",
                serde_json::json!({
                    "conversationId": conv.id,
                    "content": "hello",
                    "dedupToken": "req-42"
                }),
            ),
        )
        .await;
        assert!(retry.ok);
        let payload = retry.payload.unwrap();
        assert_eq!(payload["messageId"], first_id.as_str());
        assert_eq!(payload["duplicate"], true);
        // The retry dispatches nothing: no second queued message, no
        // fan-out frames.
        assert!(events.try_recv().is_err());
    }
}
