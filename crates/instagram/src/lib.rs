//! Instagram graph messaging channel: webhook parsing and outbound sends.

pub mod adapter;
pub mod outbound;

pub use {adapter::InstagramAdapter, outbound::InstagramSender};
