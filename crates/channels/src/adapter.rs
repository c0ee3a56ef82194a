use std::collections::HashMap;

use serde::Serialize;

use courier_common::{ChannelKind, ContentType, DeliveryStatus};

/// Normalized representation of any channel's incoming message payload.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedInboundMessage {
    /// Channel-native sender identifier (chat id, wa_id, IGSID, …).
    pub source_id: String,
    /// Best-effort display name extracted from the payload.
    pub display_name: Option<String>,
    pub content: String,
    pub content_type: ContentType,
    /// Phone number hint for cross-channel identity matching.
    pub phone: Option<String>,
    /// Username hint for cross-channel identity matching.
    pub username: Option<String>,
    /// Provider message id, recorded for receipt correlation.
    pub external_id: Option<String>,
    /// Original payload, retained for audit and manual replay.
    pub raw: serde_json::Value,
}

/// A provider delivery/read receipt mapped onto the internal status enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryStatusUpdate {
    /// Provider message id the receipt refers to.
    pub external_id: String,
    pub status: DeliveryStatus,
}

/// Per-channel wire parsing, implemented once per [`ChannelKind`].
///
/// All methods are pure and total over well-typed JSON: malformed or
/// irrelevant payloads yield `None`, never an error. Provider quirks (echo
/// events, nested envelopes, status-vs-message disambiguation) stay inside
/// the adapter.
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Parse an inbound contact message.
    ///
    /// `self_account_id` is the inbox's own channel-native account id; a
    /// payload authored by it (an echo of our own outbound send) yields
    /// `None` so the tenant's sends are not reprocessed as contact messages.
    fn parse_inbound(
        &self,
        raw: &serde_json::Value,
        self_account_id: Option<&str>,
    ) -> Option<UnifiedInboundMessage>;

    /// Parse an asynchronous delivery/read receipt.
    ///
    /// Channels without receipts return `None` unconditionally; a recognized
    /// receipt with unrecognized status vocabulary also returns `None`.
    fn parse_status_update(&self, raw: &serde_json::Value) -> Option<DeliveryStatusUpdate>;

    /// Extract the channel-native account identifier used to locate the
    /// target inbox on generic (non-inbox-scoped) webhook endpoints.
    fn extract_routing_key(&self, raw: &serde_json::Value) -> Option<String>;

    /// Answer the provider's subscription-verification handshake.
    ///
    /// Returns the challenge string to echo back when the shared verify
    /// token matches, `None` otherwise (including for channels without a
    /// verification handshake).
    fn verify_challenge(
        &self,
        params: &HashMap<String, String>,
        expected_token: &str,
    ) -> Option<String>;
}

/// The `hub.mode=subscribe` handshake shared by the graph-style channels.
///
/// Returns `Some(challenge)` only when the mode is `subscribe` and the
/// caller-supplied token matches the stored verify token.
pub fn verify_subscription(
    params: &HashMap<String, String>,
    expected_token: &str,
) -> Option<String> {
    let mode = params.get("hub.mode")?;
    let token = params.get("hub.verify_token")?;
    let challenge = params.get("hub.challenge")?;

    if mode == "subscribe" && token == expected_token {
        Some(challenge.clone())
    } else {
        None
    }
}
