use std::collections::HashMap;

use courier_channels::{
    ChannelAdapter, DeliveryStatusUpdate, UnifiedInboundMessage, verify_subscription,
};
use courier_common::{ChannelKind, ContentType, DeliveryStatus};

/// Adapter for Cloud API webhook payloads.
///
/// Payloads arrive wrapped in an `entry[].changes[].value` envelope; the
/// same envelope carries either contact messages (`value.messages`) or
/// delivery receipts (`value.statuses`), never both for one delivery.
#[derive(Debug, Default)]
pub struct WhatsappAdapter;

impl ChannelAdapter for WhatsappAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    fn parse_inbound(
        &self,
        raw: &serde_json::Value,
        self_account_id: Option<&str>,
    ) -> Option<UnifiedInboundMessage> {
        let value = message_change_value(raw)?;
        let msg = value.get("messages")?.as_array()?.first()?;
        let from = msg.get("from")?.as_str()?;

        if self_account_id.is_some_and(|own| own == from) {
            return None;
        }

        let (content, content_type) = extract_content(msg)?;

        // Profile names ride alongside the messages in `value.contacts`.
        let display_name = value
            .get("contacts")
            .and_then(|v| v.as_array())
            .and_then(|contacts| {
                contacts.iter().find_map(|c| {
                    (c.get("wa_id").and_then(|v| v.as_str()) == Some(from))
                        .then(|| c.get("profile")?.get("name")?.as_str())
                        .flatten()
                })
            })
            .map(str::to_string);

        let external_id = msg
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Some(UnifiedInboundMessage {
            source_id: from.to_string(),
            display_name,
            content,
            content_type,
            // The wa_id is the sender's phone number.
            phone: Some(from.to_string()),
            username: None,
            external_id,
            raw: raw.clone(),
        })
    }

    fn parse_status_update(&self, raw: &serde_json::Value) -> Option<DeliveryStatusUpdate> {
        let value = message_change_value(raw)?;
        let status = value.get("statuses")?.as_array()?.first()?;
        let external_id = status.get("id")?.as_str()?.to_string();

        let mapped = match status.get("status")?.as_str()? {
            "sent" => DeliveryStatus::Sent,
            "delivered" => DeliveryStatus::Delivered,
            "read" => DeliveryStatus::Read,
            "failed" => DeliveryStatus::Failed,
            _ => return None,
        };

        Some(DeliveryStatusUpdate {
            external_id,
            status: mapped,
        })
    }

    fn extract_routing_key(&self, raw: &serde_json::Value) -> Option<String> {
        message_change_value(raw)?
            .get("metadata")?
            .get("phone_number_id")?
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

/// Walk the envelope down to the first `messages`-field change value.
fn message_change_value(raw: &serde_json::Value) -> Option<&serde_json::Value> {
    raw.get("entry")?
        .as_array()?
        .iter()
        .flat_map(|entry| {
            entry
                .get("changes")
                .and_then(|c| c.as_array())
                .into_iter()
                .flatten()
        })
        .find(|change| change.get("field").and_then(|f| f.as_str()) == Some("messages"))?
        .get("value")
}

fn extract_content(msg: &serde_json::Value) -> Option<(String, ContentType)> {
    let msg_type = msg.get("type")?.as_str()?;
    match msg_type {
        "text" => {
            let body = msg.get("text")?.get("body")?.as_str()?;
            Some((body.to_string(), ContentType::Text))
        },
        "image" | "document" | "audio" | "video" => {
            let caption = msg
                .get(msg_type)
                .and_then(|m| m.get("caption"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let content_type = match msg_type {
                "image" => ContentType::Image,
                "document" => ContentType::File,
                "audio" => ContentType::Audio,
                _ => ContentType::Video,
            };
            Some((caption, content_type))
        },
        // Reactions, locations, system notifications: nothing to ingest.
        _ => None,
    }
}
