//! Inbound webhook ingestion.
//!
//! The pipeline turns a raw provider payload into persisted state (contact,
//! link, conversation, message) and bus events, orchestrating the channel
//! adapter, the identity resolver, and the conversation state manager.
//! Webhook handlers never run it inline: they enqueue onto the bounded
//! [`queue::IngestQueue`] and acknowledge the provider immediately.

pub mod conversation;
pub mod pipeline;
pub mod queue;
pub mod resolver;

pub use {
    pipeline::{IngestOutcome, IngestPipeline},
    queue::{IngestJob, IngestQueue},
};
