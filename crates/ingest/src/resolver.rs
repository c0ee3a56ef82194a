//! Identity resolution: channel-native sender → contact + durable link.

use {anyhow::Context, tracing::debug};

use {
    courier_channels::UnifiedInboundMessage,
    courier_store::{Contact, ContactChannelLink, Inbox, Store},
};

/// Find or create the contact and link for an inbound sender.
///
/// Two near-simultaneous webhooks for a brand-new sender can both pass the
/// "no link yet" check; the UNIQUE(inbox_id, source_id) constraint decides
/// the winner and the loser re-reads. Losing the race is not an error.
pub async fn resolve_or_create(
    store: &Store,
    inbox: &Inbox,
    message: &UnifiedInboundMessage,
) -> anyhow::Result<(ContactChannelLink, Contact)> {
    if let Some(link) = store.link_by_source(&inbox.id, &message.source_id).await? {
        // Known sender. Backfill the profile name if we learned it late.
        if link.display_name.is_none()
            && let Some(name) = &message.display_name
        {
            store.backfill_link_display_name(&link.id, name).await?;
        }
        let contact = store
            .contact(&link.contact_id)
            .await?
            .context("link points at a missing contact")?;
        return Ok((link, contact));
    }

    // New sender for this inbox: try to match an existing tenant contact by
    // the channel's identity hints before minting a new one.
    let contact = match store
        .find_contact_by_hints(
            &inbox.tenant_id,
            message.phone.as_deref(),
            message.username.as_deref(),
        )
        .await?
    {
        Some(existing) => {
            debug!(contact_id = %existing.id, source_id = %message.source_id, "matched contact by identity hint");
            existing
        },
        None => {
            let display_name = message
                .display_name
                .clone()
                .unwrap_or_else(|| message.source_id.clone());
            store
                .create_contact(
                    &inbox.tenant_id,
                    &display_name,
                    message.phone.as_deref(),
                    message.username.as_deref(),
                )
                .await?
        },
    };

    match store
        .create_link(
            &inbox.id,
            &contact.id,
            &message.source_id,
            message.display_name.as_deref(),
        )
        .await
    {
        Ok(link) => Ok((link, contact)),
        Err(e) if e.is_unique_violation() => {
            // A concurrent webhook created the link first; use theirs.
            debug!(inbox_id = %inbox.id, source_id = %message.source_id, "lost link insert race, re-reading");
            let link = store
                .link_by_source(&inbox.id, &message.source_id)
                .await?
                .context("link vanished after unique violation")?;
            let contact = store
                .contact(&link.contact_id)
                .await?
                .context("link points at a missing contact")?;
            Ok((link, contact))
        },
        Err(e) => Err(e.into()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_common::{ChannelKind, ContentType},
        courier_store::NewInbox,
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn store_with_inbox() -> (Store, Inbox) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::init(&pool).await.unwrap();
        let store = Store::new(pool);
        let inbox = store
            .create_inbox(NewInbox {
                tenant_id: "t1".into(),
                channel_kind: ChannelKind::Telegram,
                name: "Support".into(),
                credentials: serde_json::json!({"channel": "telegram", "bot_token": "x"}),
                routing_key: None,
            })
            .await
            .unwrap();
        (store, inbox)
    }

    fn unified(source_id: &str) -> UnifiedInboundMessage {
        UnifiedInboundMessage {
            source_id: source_id.into(),
            display_name: Some("Ada Lovelace".into()),
            content: "hi".into(),
            content_type: ContentType::Text,
            phone: None,
            username: Some("ada".into()),
            external_id: None,
            raw: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn creates_contact_and_link_for_new_sender() {
        let (store, inbox) = store_with_inbox().await;
        let (link, contact) = resolve_or_create(&store, &inbox, &unified("9912"))
            .await
            .unwrap();
        assert_eq!(link.source_id, "9912");
        assert_eq!(link.contact_id, contact.id);
        assert_eq!(contact.display_name, "Ada Lovelace");
        assert_eq!(contact.username.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn replay_resolves_to_same_contact() {
        let (store, inbox) = store_with_inbox().await;
        let msg = unified("9912");
        let (link_a, contact_a) = resolve_or_create(&store, &inbox, &msg).await.unwrap();
        let (link_b, contact_b) = resolve_or_create(&store, &inbox, &msg).await.unwrap();
        assert_eq!(link_a.id, link_b.id);
        assert_eq!(contact_a.id, contact_b.id);
    }

    #[tokio::test]
    async fn matches_existing_contact_by_username() {
        let (store, inbox) = store_with_inbox().await;
        let existing = store
            .create_contact("t1", "Ada from WhatsApp", None, Some("ada"))
            .await
            .unwrap();

        let (_, contact) = resolve_or_create(&store, &inbox, &unified("9912"))
            .await
            .unwrap();
        assert_eq!(contact.id, existing.id);
    }

    #[tokio::test]
    async fn nameless_sender_falls_back_to_source_id() {
        let (store, inbox) = store_with_inbox().await;
        let mut msg = unified("6017533191");
        msg.display_name = None;
        msg.username = None;

        let (_, contact) = resolve_or_create(&store, &inbox, &msg).await.unwrap();
        assert_eq!(contact.display_name, "6017533191");
    }

    #[tokio::test]
    async fn backfills_link_display_name() {
        let (store, inbox) = store_with_inbox().await;
        let mut anonymous = unified("9912");
        anonymous.display_name = None;
        anonymous.username = None;
        let (link, _) = resolve_or_create(&store, &inbox, &anonymous).await.unwrap();
        assert!(link.display_name.is_none());

        let (link, _) = resolve_or_create(&store, &inbox, &unified("9912"))
            .await
            .unwrap();
        let reloaded = store.link(&link.id).await.unwrap().unwrap();
        assert_eq!(reloaded.display_name.as_deref(), Some("Ada Lovelace"));
    }
}
