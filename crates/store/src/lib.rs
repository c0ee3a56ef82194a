//! SQLite persistence for inboxes, contacts, channel links, conversations,
//! and messages.
//!
//! Concurrency contracts live in the schema: UNIQUE(inbox_id, source_id) on
//! links and a partial unique index on open conversations make the
//! read-then-create paths in the ingest pipeline safe to race. Losing an
//! insert race surfaces as [`Error::UniqueViolation`], which callers treat
//! as "re-read and use the winner."

mod models;
mod store;

pub use {
    models::{Contact, ContactChannelLink, Conversation, Inbox, Message, NewInbox, NewMessage},
    store::Store,
};

/// Store-level result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An insert lost a uniqueness race; the caller should re-read.
    #[error("unique constraint violation: {context}")]
    UniqueViolation { context: String },

    /// A persisted enum value no longer parses (schema drift or manual
    /// edits).
    #[error("corrupt row: {message}")]
    Corrupt { message: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    /// Classify an sqlx error, turning unique-constraint failures into the
    /// typed variant callers retry on.
    fn from_sqlx(e: sqlx::Error, context: &str) -> Self {
        if let sqlx::Error::Database(ref db) = e
            && db.is_unique_violation()
        {
            return Self::UniqueViolation {
                context: context.to_string(),
            };
        }
        Self::Sqlx(e)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
