//! WhatsApp Cloud API channel: webhook parsing, outbound sends, and lazy
//! access-token refresh.

pub mod adapter;
pub mod outbound;

pub use {
    adapter::WhatsappAdapter,
    outbound::{REFRESH_LOOKAHEAD_SECS, RefreshedToken, WhatsappSender, needs_refresh},
};
