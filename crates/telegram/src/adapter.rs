use std::collections::HashMap;

use courier_channels::{ChannelAdapter, DeliveryStatusUpdate, UnifiedInboundMessage};
use courier_common::{ChannelKind, ContentType};

/// Adapter for bot-API webhook updates.
///
/// Updates arrive on per-inbox webhook URLs, so there is no routing key to
/// extract, and the bot API has neither delivery receipts nor a
/// subscription-verification handshake.
#[derive(Debug, Default)]
pub struct TelegramAdapter;

impl ChannelAdapter for TelegramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn parse_inbound(
        &self,
        raw: &serde_json::Value,
        self_account_id: Option<&str>,
    ) -> Option<UnifiedInboundMessage> {
        let message = raw.get("message")?;
        let from = message.get("from")?;
        let sender_id = from.get("id")?.as_i64()?.to_string();

        // Drop echoes of the inbox's own bot and any other bot traffic the
        // provider forwards.
        if self_account_id.is_some_and(|own| own == sender_id) {
            return None;
        }
        if from.get("is_bot").and_then(|v| v.as_bool()) == Some(true) {
            return None;
        }

        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_i64())?
            .to_string();

        let (content, content_type) = extract_content(message)?;

        let first_name = from.get("first_name").and_then(|v| v.as_str());
        let last_name = from.get("last_name").and_then(|v| v.as_str());
        let display_name = match (first_name, last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f.to_string()),
            _ => None,
        };
        let username = from
            .get("username")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let external_id = message
            .get("message_id")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string());

        Some(UnifiedInboundMessage {
            source_id: chat_id,
            display_name,
            content,
            content_type,
            phone: None,
            username,
            external_id,
            raw: raw.clone(),
        })
    }

    fn parse_status_update(&self, _raw: &serde_json::Value) -> Option<DeliveryStatusUpdate> {
        // The bot API reports no delivery or read receipts.
        None
    }

    fn extract_routing_key(&self, _raw: &serde_json::Value) -> Option<String> {
        None
    }

    fn verify_challenge(
        &self,
        _params: &HashMap<String, String>,
        _expected_token: &str,
    ) -> Option<String> {
        None
    }
}

/// Pull the message body and its detected content type out of an update.
///
/// Media messages use the caption as content, empty when absent. Updates
/// with no processable content (stickers, service messages, …) yield `None`.
fn extract_content(message: &serde_json::Value) -> Option<(String, ContentType)> {
    if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
        return Some((text.to_string(), ContentType::Text));
    }

    let caption = message
        .get("caption")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if message.get("photo").is_some() {
        return Some((caption, ContentType::Image));
    }
    if message.get("document").is_some() {
        return Some((caption, ContentType::File));
    }
    if message.get("voice").is_some() || message.get("audio").is_some() {
        return Some((caption, ContentType::Audio));
    }
    if message.get("video").is_some() {
        return Some((caption, ContentType::Video));
    }

    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: &str) -> serde_json::Value {
        serde_json::json!({
            "update_id": 10001,
            "message": {
                "message_id": 42,
                "from": {
                    "id": 9912,
                    "is_bot": false,
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "username": "ada"
                },
                "chat": {"id": 9912, "type": "private"},
                "date": 1700000000,
                "text": text
            }
        })
    }

    #[test]
    fn parses_text_message() {
        let msg = TelegramAdapter.parse_inbound(&update("hello"), None).unwrap();
        assert_eq!(msg.source_id, "9912");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(msg.username.as_deref(), Some("ada"));
        assert_eq!(msg.external_id.as_deref(), Some("42"));
    }

    #[test]
    fn parses_photo_with_caption() {
        let mut raw = update("");
        let message = raw.get_mut("message").unwrap();
        message.as_object_mut().unwrap().remove("text");
        message["photo"] = serde_json::json!([{"file_id": "f1", "width": 90, "height": 90}]);
        message["caption"] = serde_json::json!("look at this");

        let msg = TelegramAdapter.parse_inbound(&raw, None).unwrap();
        assert_eq!(msg.content, "look at this");
        assert_eq!(msg.content_type, ContentType::Image);
    }

    #[test]
    fn ignores_update_without_message() {
        let raw = serde_json::json!({"update_id": 1, "edited_message": {}});
        assert!(TelegramAdapter.parse_inbound(&raw, None).is_none());
    }

    #[test]
    fn ignores_unprocessable_message_kinds() {
        let mut raw = update("");
        let message = raw.get_mut("message").unwrap().as_object_mut().unwrap();
        message.remove("text");
        message.insert("sticker".into(), serde_json::json!({"file_id": "s1"}));
        assert!(TelegramAdapter.parse_inbound(&raw, None).is_none());
    }

    #[test]
    fn filters_own_bot_echo() {
        let mut raw = update("echoed");
        raw["message"]["from"]["id"] = serde_json::json!(777);
        raw["message"]["from"]["is_bot"] = serde_json::json!(true);
        assert!(TelegramAdapter.parse_inbound(&raw, Some("777")).is_none());
    }

    #[test]
    fn filters_other_bots() {
        let mut raw = update("from a bot");
        raw["message"]["from"]["is_bot"] = serde_json::json!(true);
        assert!(TelegramAdapter.parse_inbound(&raw, None).is_none());
    }

    #[test]
    fn malformed_but_well_typed_input_is_total() {
        for raw in [
            serde_json::json!(null),
            serde_json::json!([]),
            serde_json::json!({"message": {"from": {"id": "not a number"}}}),
            serde_json::json!({"message": {"from": {"id": 1}, "chat": {}}}),
        ] {
            assert!(TelegramAdapter.parse_inbound(&raw, None).is_none());
        }
    }

    #[test]
    fn no_status_updates_or_challenge() {
        assert!(TelegramAdapter.parse_status_update(&update("x")).is_none());
        assert!(TelegramAdapter.extract_routing_key(&update("x")).is_none());
        assert!(
            TelegramAdapter
                .verify_challenge(&HashMap::new(), "token")
                .is_none()
        );
    }
}
