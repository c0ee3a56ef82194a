use {clap::Subcommand, tracing::info};

use {
    courier_common::ChannelKind,
    courier_config::CourierConfig,
    courier_store::{NewInbox, Store},
};

#[derive(Subcommand)]
pub enum DbAction {
    /// Create the database file and schema.
    Init,
    /// Insert a demo tenant with one inbox per channel.
    Seed,
}

pub async fn handle_db(config: &CourierConfig, action: DbAction) -> anyhow::Result<()> {
    match action {
        DbAction::Init => init(config).await,
        DbAction::Seed => seed(config).await,
    }
}

async fn init(config: &CourierConfig) -> anyhow::Result<()> {
    Store::connect(&config.database.url).await?;
    info!(url = %config.database.url, "database initialized");
    println!("Database ready at {}", config.database.url);
    Ok(())
}

/// Placeholder credentials; replace them before connecting real channels.
async fn seed(config: &CourierConfig) -> anyhow::Result<()> {
    let store = Store::connect(&config.database.url).await?;

    let seeds = [
        (
            ChannelKind::Telegram,
            "Telegram support",
            serde_json::json!({"channel": "telegram", "bot_token": "${TELEGRAM_BOT_TOKEN}"}),
            None,
        ),
        (
            ChannelKind::Whatsapp,
            "WhatsApp support",
            serde_json::json!({
                "channel": "whatsapp",
                "phone_number_id": "000000000000000",
                "access_token": "${WHATSAPP_ACCESS_TOKEN}",
                "verify_token": "change-me"
            }),
            Some("000000000000000"),
        ),
        (
            ChannelKind::Instagram,
            "Instagram support",
            serde_json::json!({
                "channel": "instagram",
                "account_id": "00000000000000000",
                "access_token": "${INSTAGRAM_ACCESS_TOKEN}",
                "verify_token": "change-me"
            }),
            Some("00000000000000000"),
        ),
    ];

    for (kind, name, credentials, routing_key) in seeds {
        let inbox = store
            .create_inbox(NewInbox {
                tenant_id: "demo".into(),
                channel_kind: kind,
                name: name.into(),
                credentials,
                routing_key: routing_key.map(str::to_string),
            })
            .await?;
        println!("Created {kind} inbox '{name}' -> webhook /webhooks/{kind}/{}", inbox.id);
    }

    println!("Seeded tenant 'demo'. Add an operator token to courier.toml to connect.");
    Ok(())
}
