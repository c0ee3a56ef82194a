//! Shared leaf types for the courier workspace.
//!
//! Domain enums, id/time helpers, and the internal event bus live here so
//! that channel crates, the store, and the gateway can agree on vocabulary
//! without depending on each other.

pub mod bus;
pub mod types;

pub use {
    bus::{EventBus, HubEvent, DEFAULT_BUS_CAPACITY},
    types::{ChannelKind, ContentType, ConversationStatus, DeliveryStatus, Direction},
};

/// Generate a new opaque entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as unix seconds.
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
