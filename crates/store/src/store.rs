use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use courier_common::{
    ChannelKind, ContentType, ConversationStatus, DeliveryStatus, Direction, new_id, now_unix,
};

use crate::{
    Error, Result,
    models::{Contact, ContactChannelLink, Conversation, Inbox, Message, NewInbox, NewMessage},
};

/// SQLite-backed store shared by the ingest pipeline, the dispatcher, and
/// the gateway.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating the file if needed) and initialize the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(Error::Sqlx)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Initialize the schema. Idempotent.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS inboxes (
                id           TEXT PRIMARY KEY,
                tenant_id    TEXT NOT NULL,
                channel_kind TEXT NOT NULL,
                name         TEXT NOT NULL,
                credentials  TEXT NOT NULL,
                routing_key  TEXT,
                status       TEXT NOT NULL DEFAULT 'active',
                created_at   INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_inboxes_routing
             ON inboxes (channel_kind, routing_key)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                id           TEXT PRIMARY KEY,
                tenant_id    TEXT NOT NULL,
                display_name TEXT NOT NULL,
                phone        TEXT,
                username     TEXT,
                email        TEXT,
                created_at   INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contact_channel_links (
                id           TEXT PRIMARY KEY,
                inbox_id     TEXT NOT NULL,
                contact_id   TEXT NOT NULL,
                source_id    TEXT NOT NULL,
                display_name TEXT,
                created_at   INTEGER NOT NULL,
                UNIQUE (inbox_id, source_id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id                     TEXT PRIMARY KEY,
                tenant_id              TEXT NOT NULL,
                inbox_id               TEXT NOT NULL,
                link_id                TEXT NOT NULL,
                status                 TEXT NOT NULL DEFAULT 'open',
                unread_count           INTEGER NOT NULL DEFAULT 0,
                last_message_content   TEXT,
                last_message_at        INTEGER,
                last_message_direction TEXT,
                assignee               TEXT,
                labels                 TEXT NOT NULL DEFAULT '[]',
                created_at             INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // At most one open conversation per link, enforced at the data
        // layer so concurrent ingest workers cannot open duplicates.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_open_link
             ON conversations (link_id) WHERE status = 'open'",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                content         TEXT NOT NULL,
                content_type    TEXT NOT NULL,
                direction       TEXT NOT NULL,
                status          TEXT NOT NULL,
                external_id     TEXT,
                dedup_token     TEXT,
                raw_payload     TEXT,
                created_at      INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_external
             ON messages (external_id)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedup
             ON messages (conversation_id, dedup_token)
             WHERE dedup_token IS NOT NULL",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ── Inboxes ──────────────────────────────────────────────────────────

    pub async fn create_inbox(&self, new: NewInbox) -> Result<Inbox> {
        let inbox = Inbox {
            id: new_id(),
            tenant_id: new.tenant_id,
            channel_kind: new.channel_kind,
            name: new.name,
            credentials: new.credentials,
            routing_key: new.routing_key,
            status: "active".into(),
            created_at: now_unix(),
        };

        sqlx::query(
            "INSERT INTO inboxes
             (id, tenant_id, channel_kind, name, credentials, routing_key, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&inbox.id)
        .bind(&inbox.tenant_id)
        .bind(inbox.channel_kind.as_str())
        .bind(&inbox.name)
        .bind(inbox.credentials.to_string())
        .bind(&inbox.routing_key)
        .bind(&inbox.status)
        .bind(inbox.created_at)
        .execute(&self.pool)
        .await?;

        Ok(inbox)
    }

    pub async fn inbox(&self, id: &str) -> Result<Option<Inbox>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                Option<String>,
                String,
                i64,
            ),
        >(
            "SELECT id, tenant_id, channel_kind, name, credentials, routing_key, status, created_at
             FROM inboxes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_inbox).transpose()
    }

    /// Tenant-resolution lookup for generic webhook endpoints.
    pub async fn find_inbox_by_routing_key(
        &self,
        kind: ChannelKind,
        routing_key: &str,
    ) -> Result<Option<Inbox>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                String,
                String,
                Option<String>,
                String,
                i64,
            ),
        >(
            "SELECT id, tenant_id, channel_kind, name, credentials, routing_key, status, created_at
             FROM inboxes WHERE channel_kind = ? AND routing_key = ?",
        )
        .bind(kind.as_str())
        .bind(routing_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_inbox).transpose()
    }

    /// Write back refreshed credentials. The only inbox mutation the core
    /// performs.
    pub async fn update_inbox_credentials(
        &self,
        inbox_id: &str,
        credentials: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query("UPDATE inboxes SET credentials = ? WHERE id = ?")
            .bind(credentials.to_string())
            .bind(inbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Flip an inbox's lifecycle status (`active`, `disconnected`, ...).
    /// Ingest drops payloads for anything not `active`.
    pub async fn set_inbox_status(&self, inbox_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE inboxes SET status = ? WHERE id = ?")
            .bind(status)
            .bind(inbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── Contacts ─────────────────────────────────────────────────────────

    pub async fn create_contact(
        &self,
        tenant_id: &str,
        display_name: &str,
        phone: Option<&str>,
        username: Option<&str>,
    ) -> Result<Contact> {
        let contact = Contact {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            display_name: display_name.to_string(),
            phone: phone.map(str::to_string),
            username: username.map(str::to_string),
            email: None,
            created_at: now_unix(),
        };

        sqlx::query(
            "INSERT INTO contacts (id, tenant_id, display_name, phone, username, email, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&contact.id)
        .bind(&contact.tenant_id)
        .bind(&contact.display_name)
        .bind(&contact.phone)
        .bind(&contact.username)
        .bind(&contact.email)
        .bind(contact.created_at)
        .execute(&self.pool)
        .await?;

        Ok(contact)
    }

    pub async fn contact(&self, id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                i64,
            ),
        >(
            "SELECT id, tenant_id, display_name, phone, username, email, created_at
             FROM contacts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(decode_contact))
    }

    /// Cross-channel identity match by phone or username, tenant-scoped.
    pub async fn find_contact_by_hints(
        &self,
        tenant_id: &str,
        phone: Option<&str>,
        username: Option<&str>,
    ) -> Result<Option<Contact>> {
        if let Some(phone) = phone {
            let found = self
                .find_contact_where(tenant_id, "phone", phone)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        if let Some(username) = username {
            return self
                .find_contact_where(tenant_id, "username", username)
                .await;
        }
        Ok(None)
    }

    async fn find_contact_where(
        &self,
        tenant_id: &str,
        column: &str,
        value: &str,
    ) -> Result<Option<Contact>> {
        // Column name comes from a fixed internal set, never user input.
        let sql = format!(
            "SELECT id, tenant_id, display_name, phone, username, email, created_at
             FROM contacts WHERE tenant_id = ? AND {column} = ?"
        );
        let row = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                Option<String>,
                Option<String>,
                Option<String>,
                i64,
            ),
        >(&sql)
        .bind(tenant_id)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(decode_contact))
    }

    // ── Contact channel links ────────────────────────────────────────────

    pub async fn create_link(
        &self,
        inbox_id: &str,
        contact_id: &str,
        source_id: &str,
        display_name: Option<&str>,
    ) -> Result<ContactChannelLink> {
        let link = ContactChannelLink {
            id: new_id(),
            inbox_id: inbox_id.to_string(),
            contact_id: contact_id.to_string(),
            source_id: source_id.to_string(),
            display_name: display_name.map(str::to_string),
            created_at: now_unix(),
        };

        sqlx::query(
            "INSERT INTO contact_channel_links
             (id, inbox_id, contact_id, source_id, display_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&link.id)
        .bind(&link.inbox_id)
        .bind(&link.contact_id)
        .bind(&link.source_id)
        .bind(&link.display_name)
        .bind(link.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, "contact_channel_links(inbox_id, source_id)"))?;

        Ok(link)
    }

    pub async fn link(&self, id: &str) -> Result<Option<ContactChannelLink>> {
        self.fetch_link("id", id).await
    }

    pub async fn link_by_source(
        &self,
        inbox_id: &str,
        source_id: &str,
    ) -> Result<Option<ContactChannelLink>> {
        let row = sqlx::query_as::<_, (String, String, String, String, Option<String>, i64)>(
            "SELECT id, inbox_id, contact_id, source_id, display_name, created_at
             FROM contact_channel_links WHERE inbox_id = ? AND source_id = ?",
        )
        .bind(inbox_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(decode_link))
    }

    async fn fetch_link(&self, column: &str, value: &str) -> Result<Option<ContactChannelLink>> {
        let sql = format!(
            "SELECT id, inbox_id, contact_id, source_id, display_name, created_at
             FROM contact_channel_links WHERE {column} = ?"
        );
        let row = sqlx::query_as::<_, (String, String, String, String, Option<String>, i64)>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(decode_link))
    }

    /// Backfill a link's display name once a payload reports one. The only
    /// permitted link mutation.
    pub async fn backfill_link_display_name(&self, link_id: &str, name: &str) -> Result<()> {
        sqlx::query(
            "UPDATE contact_channel_links SET display_name = ?
             WHERE id = ? AND display_name IS NULL",
        )
        .bind(name)
        .bind(link_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ── Conversations ────────────────────────────────────────────────────

    pub async fn create_conversation(
        &self,
        tenant_id: &str,
        inbox_id: &str,
        link_id: &str,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: new_id(),
            tenant_id: tenant_id.to_string(),
            inbox_id: inbox_id.to_string(),
            link_id: link_id.to_string(),
            status: ConversationStatus::Open,
            unread_count: 0,
            last_message_content: None,
            last_message_at: None,
            last_message_direction: None,
            assignee: None,
            labels: Vec::new(),
            created_at: now_unix(),
        };

        sqlx::query(
            "INSERT INTO conversations
             (id, tenant_id, inbox_id, link_id, status, unread_count, labels, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.tenant_id)
        .bind(&conversation.inbox_id)
        .bind(&conversation.link_id)
        .bind(conversation.status.as_str())
        .bind(conversation.unread_count)
        .bind("[]")
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, "conversations(link_id) where open"))?;

        Ok(conversation)
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "{CONVERSATION_SELECT} WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_conversation).transpose()
    }

    pub async fn open_conversation_for_link(&self, link_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "{CONVERSATION_SELECT} WHERE link_id = ? AND status = 'open'"
        ))
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_conversation).transpose()
    }

    /// Persist the mutable portion of a conversation (status, counters,
    /// preview, assignment, labels).
    pub async fn update_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET
                status = ?, unread_count = ?, last_message_content = ?,
                last_message_at = ?, last_message_direction = ?, assignee = ?, labels = ?
             WHERE id = ?",
        )
        .bind(conversation.status.as_str())
        .bind(conversation.unread_count)
        .bind(&conversation.last_message_content)
        .bind(conversation.last_message_at)
        .bind(conversation.last_message_direction.map(|d| d.as_str()))
        .bind(&conversation.assignee)
        .bind(serde_json::to_string(&conversation.labels)?)
        .bind(&conversation.id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, "conversations(link_id) where open"))?;
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    pub async fn create_message(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: new_id(),
            conversation_id: new.conversation_id,
            content: new.content,
            content_type: new.content_type,
            direction: new.direction,
            status: new.status,
            external_id: new.external_id,
            dedup_token: new.dedup_token,
            raw_payload: new.raw_payload,
            created_at: now_unix(),
        };

        sqlx::query(
            "INSERT INTO messages
             (id, conversation_id, content, content_type, direction, status,
              external_id, dedup_token, raw_payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.content)
        .bind(message.content_type.as_str())
        .bind(message.direction.as_str())
        .bind(message.status.as_str())
        .bind(&message.external_id)
        .bind(&message.dedup_token)
        .bind(message.raw_payload.as_ref().map(|v| v.to_string()))
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, "messages(conversation_id, dedup_token)"))?;

        Ok(message)
    }

    pub async fn message(&self, id: &str) -> Result<Option<Message>> {
        self.fetch_message("id", id).await
    }

    /// Receipt correlation lookup.
    pub async fn message_by_external_id(&self, external_id: &str) -> Result<Option<Message>> {
        self.fetch_message("external_id", external_id).await
    }

    pub async fn message_by_dedup_token(
        &self,
        conversation_id: &str,
        dedup_token: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "{MESSAGE_SELECT} WHERE conversation_id = ? AND dedup_token = ?"
        ))
        .bind(conversation_id)
        .bind(dedup_token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_message).transpose()
    }

    async fn fetch_message(&self, column: &str, value: &str) -> Result<Option<Message>> {
        let sql = format!("{MESSAGE_SELECT} WHERE {column} = ?");
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(decode_message).transpose()
    }

    pub async fn update_message_status(&self, id: &str, status: DeliveryStatus) -> Result<()> {
        sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the provider message id returned by a successful dispatch.
    pub async fn set_message_external_id(&self, id: &str, external_id: &str) -> Result<()> {
        sqlx::query("UPDATE messages SET external_id = ? WHERE id = ?")
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ── Row decoding ─────────────────────────────────────────────────────────────

const CONVERSATION_SELECT: &str = "SELECT id, tenant_id, inbox_id, link_id, status, unread_count,
        last_message_content, last_message_at, last_message_direction,
        assignee, labels, created_at
 FROM conversations";

const MESSAGE_SELECT: &str = "SELECT id, conversation_id, content, content_type, direction, status,
        external_id, dedup_token, raw_payload, created_at
 FROM messages";

type ConversationRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    String,
    i64,
);

type MessageRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

fn parse_enum<T: FromStr>(value: &str, what: &str) -> Result<T> {
    value.parse().map_err(|_| Error::Corrupt {
        message: format!("bad {what} value: {value}"),
    })
}

fn decode_inbox(
    r: (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        String,
        i64,
    ),
) -> Result<Inbox> {
    Ok(Inbox {
        id: r.0,
        tenant_id: r.1,
        channel_kind: parse_enum(&r.2, "channel_kind")?,
        name: r.3,
        credentials: serde_json::from_str(&r.4)?,
        routing_key: r.5,
        status: r.6,
        created_at: r.7,
    })
}

fn decode_contact(
    r: (
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
    ),
) -> Contact {
    Contact {
        id: r.0,
        tenant_id: r.1,
        display_name: r.2,
        phone: r.3,
        username: r.4,
        email: r.5,
        created_at: r.6,
    }
}

fn decode_link(r: (String, String, String, String, Option<String>, i64)) -> ContactChannelLink {
    ContactChannelLink {
        id: r.0,
        inbox_id: r.1,
        contact_id: r.2,
        source_id: r.3,
        display_name: r.4,
        created_at: r.5,
    }
}

fn decode_conversation(r: ConversationRow) -> Result<Conversation> {
    Ok(Conversation {
        id: r.0,
        tenant_id: r.1,
        inbox_id: r.2,
        link_id: r.3,
        status: parse_enum(&r.4, "status")?,
        unread_count: r.5,
        last_message_content: r.6,
        last_message_at: r.7,
        last_message_direction: r.8.as_deref().map(|d| parse_enum(d, "direction")).transpose()?,
        assignee: r.9,
        labels: serde_json::from_str(&r.10)?,
        created_at: r.11,
    })
}

fn decode_message(r: MessageRow) -> Result<Message> {
    Ok(Message {
        id: r.0,
        conversation_id: r.1,
        content: r.2,
        content_type: parse_enum(&r.3, "content_type")?,
        direction: parse_enum(&r.4, "direction")?,
        status: parse_enum(&r.5, "status")?,
        external_id: r.6,
        dedup_token: r.7,
        raw_payload: r.8.as_deref().map(serde_json::from_str).transpose()?,
        created_at: r.9,
    })
}
