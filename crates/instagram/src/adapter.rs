use std::collections::HashMap;

use courier_channels::{
    ChannelAdapter, DeliveryStatusUpdate, UnifiedInboundMessage, verify_subscription,
};
use courier_common::{ChannelKind, ContentType, DeliveryStatus};

/// Adapter for Instagram graph webhook payloads.
///
/// The graph API echoes the account's own outbound sends back through the
/// webhook with `message.is_echo` set; those must be filtered or every
/// operator reply would reappear as a contact message.
#[derive(Debug, Default)]
pub struct InstagramAdapter;

impl ChannelAdapter for InstagramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Instagram
    }

    fn parse_inbound(
        &self,
        raw: &serde_json::Value,
        self_account_id: Option<&str>,
    ) -> Option<UnifiedInboundMessage> {
        let event = first_messaging_event(raw)?;
        let message = event.get("message")?;

        if message.get("is_echo").and_then(|v| v.as_bool()) == Some(true) {
            return None;
        }

        let sender_id = event.get("sender")?.get("id")?.as_str()?;
        if self_account_id.is_some_and(|own| own == sender_id) {
            return None;
        }

        let (content, content_type) = extract_content(message)?;

        let external_id = message
            .get("mid")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Some(UnifiedInboundMessage {
            source_id: sender_id.to_string(),
            // The graph payload carries no profile name; the resolver falls
            // back to the scoped sender id.
            display_name: None,
            content,
            content_type,
            phone: None,
            username: None,
            external_id,
            raw: raw.clone(),
        })
    }

    fn parse_status_update(&self, raw: &serde_json::Value) -> Option<DeliveryStatusUpdate> {
        let event = first_messaging_event(raw)?;

        for (key, status) in [
            ("delivery", DeliveryStatus::Delivered),
            ("read", DeliveryStatus::Read),
        ] {
            if let Some(receipt) = event.get(key) {
                let mid = receipt
                    .get("mids")
                    .and_then(|m| m.as_array())
                    .and_then(|m| m.first())
                    .and_then(|v| v.as_str())?;
                return Some(DeliveryStatusUpdate {
                    external_id: mid.to_string(),
                    status,
                });
            }
        }

        None
    }

    fn extract_routing_key(&self, raw: &serde_json::Value) -> Option<String> {
        raw.get("entry")?
            .as_array()?
            .first()?
            .get("id")?
            .as_str()
            .map(str::to_string)
    }

    fn verify_challenge(
        &self,
        params: &HashMap<String, String>,
        expected_token: &str,
    ) -> Option<String> {
        verify_subscription(params, expected_token)
    }
}

fn first_messaging_event(raw: &serde_json::Value) -> Option<&serde_json::Value> {
    raw.get("entry")?
        .as_array()?
        .iter()
        .find_map(|entry| entry.get("messaging")?.as_array()?.first())
}

fn extract_content(message: &serde_json::Value) -> Option<(String, ContentType)> {
    if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
        return Some((text.to_string(), ContentType::Text));
    }

    let attachment = message
        .get("attachments")
        .and_then(|a| a.as_array())
        .and_then(|a| a.first())?;
    let content_type = match attachment.get("type").and_then(|v| v.as_str())? {
        "image" => ContentType::Image,
        "audio" => ContentType::Audio,
        "video" => ContentType::Video,
        "file" => ContentType::File,
        _ => return None,
    };
    // Attachment messages have no text body.
    Some((String::new(), content_type))
}
