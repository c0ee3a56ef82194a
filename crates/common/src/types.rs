use serde::{Deserialize, Serialize};

/// Parse error for the string forms of the domain enums.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError::new(stringify!($name), other)),
                }
            }
        }
    };
}

/// External messaging platform an inbox is connected to.
///
/// Immutable for the lifetime of an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Telegram,
    Whatsapp,
    Instagram,
}

str_enum!(ChannelKind {
    Telegram => "telegram",
    Whatsapp => "whatsapp",
    Instagram => "instagram",
});

/// Detected content type of a message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    File,
    Audio,
    Video,
}

str_enum!(ContentType {
    Text => "text",
    Image => "image",
    File => "file",
    Audio => "audio",
    Video => "video",
});

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// From the contact, via a channel webhook.
    Inbound,
    /// From an operator, dispatched out to the channel.
    Outbound,
}

str_enum!(Direction {
    Inbound => "inbound",
    Outbound => "outbound",
});

/// Delivery lifecycle of a message.
///
/// Outbound messages start at `Sending`; inbound messages are persisted as
/// `Delivered` (they evidently reached us).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

str_enum!(DeliveryStatus {
    Sending => "sending",
    Sent => "sent",
    Delivered => "delivered",
    Read => "read",
    Failed => "failed",
});

/// Conversation workflow state.
///
/// There is no terminal state: `Resolved` and `Snoozed` reopen on activity
/// in either direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Snoozed,
}

str_enum!(ConversationStatus {
    Open => "open",
    Pending => "pending",
    Resolved => "resolved",
    Snoozed => "snoozed",
});
