//! Telegram bot-API channel: webhook parsing and outbound sends.

pub mod adapter;
pub mod outbound;

pub use {adapter::TelegramAdapter, outbound::TelegramSender};
