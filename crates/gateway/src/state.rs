use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use tokio::sync::{mpsc, RwLock};

use {
    courier_channels::AdapterRegistry,
    courier_common::EventBus,
    courier_config::ChannelEndpoints,
    courier_ingest::IngestQueue,
    courier_store::Store,
};

use crate::auth::OperatorAuth;

// ── Connected client ─────────────────────────────────────────────────────────

/// A WebSocket client that completed the handshake.
#[derive(Debug)]
pub struct ConnectedClient {
    pub conn_id: String,
    pub tenant_id: String,
    /// Channel feeding this client's write loop with serialized frames.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    /// Send a serialized JSON frame. Returns false when the write loop is
    /// gone; the broadcaster skips such clients and cleanup removes them.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared state behind every HTTP handler and WebSocket connection.
pub struct GatewayState {
    pub store: Store,
    pub bus: EventBus,
    pub queue: IngestQueue,
    pub adapters: Arc<AdapterRegistry>,
    pub auth: Arc<dyn OperatorAuth>,
    pub endpoints: ChannelEndpoints,
    seq: AtomicU64,
    /// Connected clients grouped by tenant; events never cross groups.
    clients: RwLock<HashMap<String, HashMap<String, ConnectedClient>>>,
}

impl GatewayState {
    pub fn new(
        store: Store,
        bus: EventBus,
        queue: IngestQueue,
        adapters: Arc<AdapterRegistry>,
        auth: Arc<dyn OperatorAuth>,
        endpoints: ChannelEndpoints,
    ) -> Self {
        Self {
            store,
            bus,
            queue,
            adapters,
            auth,
            endpoints,
            seq: AtomicU64::new(0),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Monotonic per-process sequence number stamped onto event frames.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn register_client(&self, client: ConnectedClient) {
        self.clients
            .write()
            .await
            .entry(client.tenant_id.clone())
            .or_default()
            .insert(client.conn_id.clone(), client);
    }

    pub async fn remove_client(&self, tenant_id: &str, conn_id: &str) -> Option<ConnectedClient> {
        let mut clients = self.clients.write().await;
        let group = clients.get_mut(tenant_id)?;
        let removed = group.remove(conn_id);
        if group.is_empty() {
            clients.remove(tenant_id);
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.values().map(HashMap::len).sum()
    }

    pub(crate) async fn with_tenant_clients<F>(&self, tenant_id: &str, mut f: F)
    where
        F: FnMut(&ConnectedClient),
    {
        if let Some(group) = self.clients.read().await.get(tenant_id) {
            for client in group.values() {
                f(client);
            }
        }
    }
}
