use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
        Router,
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use {
    courier_channels::AdapterRegistry,
    courier_common::{EventBus, DEFAULT_BUS_CAPACITY},
    courier_config::CourierConfig,
    courier_dispatch::Dispatcher,
    courier_ingest::{IngestPipeline, IngestQueue},
    courier_instagram::InstagramAdapter,
    courier_store::Store,
    courier_telegram::TelegramAdapter,
    courier_whatsapp::WhatsappAdapter,
};

use crate::{
    auth::StaticTokenAuth, broadcast::broadcast_to_tenant, state::GatewayState,
    webhooks, ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// Wire up every component around an already-connected store.
///
/// Returns the shared state; the caller starts the dispatcher and the
/// bus-to-WebSocket forwarder via [`spawn_background`].
pub fn assemble(config: &CourierConfig, store: Store) -> Arc<GatewayState> {
    let bus = EventBus::new(DEFAULT_BUS_CAPACITY);

    let mut registry = AdapterRegistry::new();
    registry.register(Box::new(TelegramAdapter));
    registry.register(Box::new(WhatsappAdapter));
    registry.register(Box::new(InstagramAdapter));
    let adapters = Arc::new(registry);

    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        Arc::clone(&adapters),
        bus.clone(),
    ));
    let queue = IngestQueue::start(
        pipeline,
        config.ingest.workers,
        config.ingest.queue_capacity,
    );

    Arc::new(GatewayState::new(
        store,
        bus,
        queue,
        adapters,
        Arc::new(StaticTokenAuth::new(config.auth.operator_tokens.clone())),
        config.channels.clone(),
    ))
}

/// Start the outbound dispatcher and the bus-to-WebSocket forwarder.
pub fn spawn_background(state: &Arc<GatewayState>) {
    let dispatcher = Arc::new(Dispatcher::new(
        state.store.clone(),
        state.bus.clone(),
        &state.endpoints,
    ));
    dispatcher.start();

    // Forward wire-visible bus events to each tenant's connected clients.
    let forward_state = Arc::clone(state);
    let mut rx = state.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(name) = event.wire_name() else { continue };
                    let tenant_id = event.tenant_id().to_string();
                    let payload = match &event {
                        courier_common::HubEvent::ConversationCreated { payload, .. }
                        | courier_common::HubEvent::ConversationUpdated { payload, .. }
                        | courier_common::HubEvent::MessageCreated { payload, .. } => {
                            payload.clone()
                        },
                        courier_common::HubEvent::MessageQueued { .. } => continue,
                    };
                    broadcast_to_tenant(&forward_state, &tenant_id, name, payload).await;
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event forwarder lagged behind the bus");
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .route(
            "/webhooks/{channel}",
            get(webhooks::generic_verify_handler).post(webhooks::generic_webhook_handler),
        )
        .route(
            "/webhooks/{channel}/{inbox_id}",
            get(webhooks::inbox_verify_handler).post(webhooks::inbox_webhook_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { gateway: state })
}

/// Start the hub: connect storage, assemble, serve until shutdown.
pub async fn run(config: CourierConfig) -> anyhow::Result<()> {
    let store = Store::connect(&config.database.url).await?;
    let state = assemble(&config, store);
    spawn_background(&state);

    let app = build_gateway_app(Arc::clone(&state));
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.gateway.client_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "protocol": courier_protocol::PROTOCOL_VERSION,
        "connections": connections,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state.gateway, addr))
}
