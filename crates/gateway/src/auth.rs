//! Operator authentication for the realtime channel.
//!
//! Token issuance lives outside this process; the gateway only validates a
//! presented bearer token against its configured table and resolves the
//! tenant it belongs to.

use async_trait::async_trait;

use courier_config::OperatorToken;

/// Validates the handshake credential and resolves the tenant.
#[async_trait]
pub trait OperatorAuth: Send + Sync {
    /// Returns the authenticated tenant id, or `None` on any mismatch.
    async fn authenticate(&self, token: &str, tenant_hint: &str) -> Option<String>;
}

/// Static token table from the config file.
pub struct StaticTokenAuth {
    tokens: Vec<OperatorToken>,
}

impl StaticTokenAuth {
    pub fn new(tokens: Vec<OperatorToken>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl OperatorAuth for StaticTokenAuth {
    async fn authenticate(&self, token: &str, tenant_hint: &str) -> Option<String> {
        self.tokens
            .iter()
            .find(|t| t.token == token && t.tenant_id == tenant_hint)
            .map(|t| t.tenant_id.clone())
    }
}
