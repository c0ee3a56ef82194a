use serde::Serialize;

use courier_common::{
    ChannelKind, ContentType, ConversationStatus, DeliveryStatus, Direction,
};

/// A tenant's connected account on one external channel.
///
/// Created by the (out-of-core) channel-connection flow; the core reads it
/// and writes back only refreshed credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbox {
    pub id: String,
    pub tenant_id: String,
    pub channel_kind: ChannelKind,
    pub name: String,
    #[serde(skip_serializing)]
    pub credentials: serde_json::Value,
    /// Channel-native account id used to resolve generic webhooks.
    pub routing_key: Option<String>,
    /// Lifecycle status; only `active` inboxes ingest.
    pub status: String,
    pub created_at: i64,
}

impl Inbox {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Fields for creating an inbox (connection flow, seeds, tests).
#[derive(Debug, Clone)]
pub struct NewInbox {
    pub tenant_id: String,
    pub channel_kind: ChannelKind,
    pub name: String,
    pub credentials: serde_json::Value,
    pub routing_key: Option<String>,
}

/// A tenant-scoped person, shared across channels via links.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub created_at: i64,
}

/// Durable mapping (inbox, channel-native sender id) → contact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChannelLink {
    pub id: String,
    pub inbox_id: String,
    pub contact_id: String,
    pub source_id: String,
    /// Profile name as last reported by the channel; backfilled when a
    /// later payload carries one.
    pub display_name: Option<String>,
    pub created_at: i64,
}

/// One thread between a channel link and the tenant's operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub inbox_id: String,
    pub link_id: String,
    pub status: ConversationStatus,
    pub unread_count: i64,
    pub last_message_content: Option<String>,
    pub last_message_at: Option<i64>,
    pub last_message_direction: Option<Direction>,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub created_at: i64,
}

/// A persisted message. Immutable once created except for delivery status
/// and the provider message id recorded after dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub content_type: ContentType,
    pub direction: Direction,
    pub status: DeliveryStatus,
    pub external_id: Option<String>,
    pub dedup_token: Option<String>,
    #[serde(skip_serializing)]
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Fields for persisting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub content: String,
    pub content_type: ContentType,
    pub direction: Direction,
    pub status: DeliveryStatus,
    pub external_id: Option<String>,
    pub dedup_token: Option<String>,
    pub raw_payload: Option<serde_json::Value>,
}
