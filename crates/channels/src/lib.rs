//! Channel adapter contract.
//!
//! Each messaging platform (Telegram, WhatsApp Cloud, Instagram) implements
//! the [`ChannelAdapter`] trait: pure parsing of provider wire formats into
//! one unified inbound model, plus the provider's subscription-verification
//! handshake. Everything downstream of the adapters is channel-agnostic.

pub mod adapter;
pub mod credentials;
pub mod error;
pub mod registry;

pub use {
    adapter::{ChannelAdapter, DeliveryStatusUpdate, UnifiedInboundMessage, verify_subscription},
    credentials::{
        ChannelCredentials, InstagramCredentials, TelegramCredentials, WhatsappCredentials,
    },
    error::{Error, Result},
    registry::AdapterRegistry,
};
