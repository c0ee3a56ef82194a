//! Internal event bus.
//!
//! One broadcast stream connects the ingest pipeline and the operator RPC
//! layer to their independent subscribers: the realtime fan-out gateway and
//! the outbound dispatcher. Delivery is non-blocking and at-least-once from
//! the publisher's perspective; a subscriber that lags simply misses events.

use {tokio::sync::broadcast, tracing::debug};

/// Default bus capacity before lagging subscribers start losing events.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Events published on the internal bus.
///
/// The first three mirror the realtime frames pushed to operator clients;
/// `MessageQueued` is internal only and triggers the outbound dispatcher.
#[derive(Debug, Clone)]
pub enum HubEvent {
    ConversationCreated {
        tenant_id: String,
        payload: serde_json::Value,
    },
    ConversationUpdated {
        tenant_id: String,
        payload: serde_json::Value,
    },
    MessageCreated {
        tenant_id: String,
        payload: serde_json::Value,
    },
    /// An operator message was persisted with status `sending` and awaits
    /// outbound dispatch.
    MessageQueued {
        tenant_id: String,
        message_id: String,
    },
}

impl HubEvent {
    /// Tenant whose broadcast group this event belongs to.
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::ConversationCreated { tenant_id, .. }
            | Self::ConversationUpdated { tenant_id, .. }
            | Self::MessageCreated { tenant_id, .. }
            | Self::MessageQueued { tenant_id, .. } => tenant_id,
        }
    }

    /// Wire event name for frames pushed to operator clients.
    ///
    /// `MessageQueued` never leaves the process.
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            Self::ConversationCreated { .. } => Some("conversation.created"),
            Self::ConversationUpdated { .. } => Some("conversation.updated"),
            Self::MessageCreated { .. } => Some("message.created"),
            Self::MessageQueued { .. } => None,
        }
    }
}

/// Cloneable handle on the broadcast stream.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HubEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Fire-and-forget: having no subscribers is normal
    /// during startup and tests.
    pub fn publish(&self, event: HubEvent) {
        let receivers = self.tx.receiver_count();
        if let Err(e) = self.tx.send(event) {
            debug!(receivers, "bus publish with no subscribers: {e}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }
}
