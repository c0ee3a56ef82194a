use serde::{Deserialize, Serialize};

/// Root configuration, usually loaded from `courier.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub ingest: IngestConfig,
    pub channels: ChannelEndpoints,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8430,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://courier.db`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://courier.db".into(),
        }
    }
}

/// A bearer token accepted on the realtime channel, bound to one tenant.
///
/// Token issuance lives in the (out-of-core) account system; this static
/// table is the gateway's view of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorToken {
    pub token: String,
    pub tenant_id: String,
}

/// Operator authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub operator_tokens: Vec<OperatorToken>,
}

/// Ingest work-queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Number of workers draining the webhook queue.
    pub workers: usize,
    /// Bounded queue depth; overflow is dropped and redelivered by the
    /// provider.
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Provider API base URLs, overridable for tests and self-hosted gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEndpoints {
    pub telegram_api_base: String,
    pub graph_api_base: String,
    /// Verify token accepted on account-level webhook verification, where
    /// the challenge arrives before any inbox can be resolved.
    pub app_verify_token: Option<String>,
}

impl Default for ChannelEndpoints {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".into(),
            graph_api_base: "https://graph.facebook.com/v19.0".into(),
            app_verify_token: None,
        }
    }
}
