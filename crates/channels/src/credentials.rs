//! Typed view of an inbox's per-channel credential blob.
//!
//! Inbox rows store credentials as JSON; this sum type keyed by channel
//! kind is the only way the dispatcher reads them, so a blob that does not
//! decode for its channel is rejected up front instead of failing mid-send.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use courier_common::ChannelKind;

/// Bot credentials for the Telegram bot API.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramCredentials {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub bot_token: Secret<String>,
    /// The bot's own numeric user id, used for echo filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,
}

impl std::fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("bot_token", &"[REDACTED]")
            .field("bot_user_id", &self.bot_user_id)
            .finish()
    }
}

/// WhatsApp Cloud API credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct WhatsappCredentials {
    /// Cloud API phone number id; also the inbox routing key.
    pub phone_number_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    /// Shared token for the subscription-verification handshake.
    pub verify_token: String,
    /// Unix timestamp when the access token expires, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for WhatsappCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsappCredentials")
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Instagram graph messaging credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct InstagramCredentials {
    /// Instagram account id; also the inbox routing key and echo filter.
    pub account_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    pub verify_token: String,
}

impl std::fmt::Debug for InstagramCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramCredentials")
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Tagged union over the per-channel credential shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelCredentials {
    Telegram(TelegramCredentials),
    Whatsapp(WhatsappCredentials),
    Instagram(InstagramCredentials),
}

impl ChannelCredentials {
    /// Decode an inbox credential blob, requiring the tag to match the
    /// inbox's channel kind. A malformed or mismatched blob yields `None`.
    pub fn from_value(kind: ChannelKind, value: &serde_json::Value) -> Option<Self> {
        let creds: Self = serde_json::from_value(value.clone()).ok()?;
        (creds.kind() == kind).then_some(creds)
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Telegram(_) => ChannelKind::Telegram,
            Self::Whatsapp(_) => ChannelKind::Whatsapp,
            Self::Instagram(_) => ChannelKind::Instagram,
        }
    }

    /// Verify token for the subscription handshake, where the channel has
    /// one.
    pub fn verify_token(&self) -> Option<&str> {
        match self {
            Self::Telegram(_) => None,
            Self::Whatsapp(c) => Some(&c.verify_token),
            Self::Instagram(c) => Some(&c.verify_token),
        }
    }

    /// The channel-native account id this inbox sends as, used for echo
    /// filtering.
    pub fn self_account_id(&self) -> Option<&str> {
        match self {
            Self::Telegram(c) => c.bot_user_id.as_deref(),
            Self::Whatsapp(c) => Some(&c.phone_number_id),
            Self::Instagram(c) => Some(&c.account_id),
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
