use std::sync::Arc;

use {
    courier_protocol::EventFrame,
    tracing::{debug, warn},
};

use crate::state::GatewayState;

/// Push an event frame to every connected client of one tenant.
///
/// The frame is serialized once and fanned out. A client whose write loop
/// has stalled or closed is skipped; it catches up from the store on
/// reconnect rather than holding back the rest of the tenant.
pub async fn broadcast_to_tenant(
    state: &Arc<GatewayState>,
    tenant_id: &str,
    event: &str,
    payload: serde_json::Value,
) {
    let seq = state.next_seq();
    let frame = EventFrame::new(event, payload, seq);
    let json = match serde_json::to_string(&frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(event, "failed to serialize broadcast event: {e}");
            return;
        },
    };

    let mut delivered = 0usize;
    let mut skipped = 0usize;
    state
        .with_tenant_clients(tenant_id, |client| {
            if client.send(&json) {
                delivered += 1;
            } else {
                skipped += 1;
            }
        })
        .await;

    debug!(event, seq, tenant_id, delivered, skipped, "broadcast event");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::StaticTokenAuth, state::ConnectedClient},
        courier_channels::AdapterRegistry,
        courier_common::EventBus,
        courier_config::ChannelEndpoints,
        courier_ingest::{IngestPipeline, IngestQueue},
        courier_store::Store,
        std::time::Instant,
        tokio::sync::mpsc,
    };

    async fn state() -> Arc<GatewayState> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let store = Store::new(pool);
        let bus = EventBus::new(8);
        let pipeline = Arc::new(IngestPipeline::new(
            store.clone(),
            Arc::new(AdapterRegistry::new()),
            bus.clone(),
        ));
        Arc::new(GatewayState::new(
            store,
            bus,
            IngestQueue::start(pipeline, 1, 4),
            Arc::new(AdapterRegistry::new()),
            Arc::new(StaticTokenAuth::new(Vec::new())),
            ChannelEndpoints::default(),
        ))
    }

    async fn connect(
        state: &Arc<GatewayState>,
        tenant: &str,
        conn: &str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .register_client(ConnectedClient {
                conn_id: conn.into(),
                tenant_id: tenant.into(),
                sender: tx,
                connected_at: Instant::now(),
            })
            .await;
        rx
    }

    #[tokio::test]
    async fn events_stay_within_the_tenant() {
        let state = state().await;
        let mut acme = connect(&state, "acme", "c1").await;
        let mut globex = connect(&state, "globex", "c2").await;

        broadcast_to_tenant(
            &state,
            "acme",
            "message.created",
            serde_json::json!({"messageId": "m1"}),
        )
        .await;

        let frame: serde_json::Value =
            serde_json::from_str(&acme.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["event"], "message.created");
        assert_eq!(frame["payload"]["messageId"], "m1");
        assert!(frame["seq"].as_u64().unwrap() >= 1);

        assert!(globex.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_client_does_not_block_the_rest() {
        let state = state().await;
        let dead = connect(&state, "acme", "dead").await;
        drop(dead);
        let mut live = connect(&state, "acme", "live").await;

        broadcast_to_tenant(&state, "acme", "conversation.updated", serde_json::json!({}))
            .await;

        let frame: serde_json::Value =
            serde_json::from_str(&live.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"], "conversation.updated");
    }
}
