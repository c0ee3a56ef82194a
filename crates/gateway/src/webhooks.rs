//! Provider webhook endpoints.
//!
//! Two route families per channel:
//! - `/webhooks/{channel}/{inbox_id}` for providers configured with a
//!   per-inbox callback URL,
//! - `/webhooks/{channel}` for providers that deliver all accounts to one
//!   app-level URL; the payload's routing key selects the inbox.
//!
//! POST handlers acknowledge with 200 before any processing: the payload is
//! enqueued and the provider never waits on parsing or storage. A full
//! queue drops the payload; providers redeliver.

use std::{collections::HashMap, str::FromStr};

use {
    axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Json},
    },
    tracing::{debug, warn},
};

use {
    courier_channels::ChannelCredentials,
    courier_common::ChannelKind,
    courier_ingest::IngestJob,
};

use crate::server::AppState;

fn parse_channel(channel: &str) -> Result<ChannelKind, StatusCode> {
    ChannelKind::from_str(channel).map_err(|_| StatusCode::NOT_FOUND)
}

fn ack() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ── Per-inbox routes ─────────────────────────────────────────────────────────

/// Subscription-verification handshake for a per-inbox callback URL.
pub async fn inbox_verify_handler(
    Path((channel, inbox_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let kind = match parse_channel(&channel) {
        Ok(k) => k,
        Err(code) => return (code, String::new()),
    };

    let inbox = match state.gateway.store.inbox(&inbox_id).await {
        Ok(Some(inbox)) if inbox.channel_kind == kind => inbox,
        Ok(_) => return (StatusCode::NOT_FOUND, String::new()),
        Err(e) => {
            warn!(inbox_id, error = %e, "webhook verify: inbox lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
        },
    };

    let token = ChannelCredentials::from_value(kind, &inbox.credentials)
        .and_then(|c| c.verify_token().map(str::to_string));
    verify_with_token(&state, kind, token.as_deref(), &params)
}

/// Payload delivery to a per-inbox callback URL.
pub async fn inbox_webhook_handler(
    Path((channel, inbox_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> impl IntoResponse {
    let Ok(_) = parse_channel(&channel) else {
        return (StatusCode::NOT_FOUND, ack());
    };
    debug!(channel, inbox_id, "webhook received");
    state
        .gateway
        .queue
        .enqueue(IngestJob::Inbound { inbox_id, raw });
    (StatusCode::OK, ack())
}

// ── Generic routes ───────────────────────────────────────────────────────────

/// Subscription-verification handshake for an app-level callback URL. The
/// challenge carries no account id, so it checks against the configured
/// app-wide verify token.
pub async fn generic_verify_handler(
    Path(channel): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let kind = match parse_channel(&channel) {
        Ok(k) => k,
        Err(code) => return (code, String::new()),
    };
    let token = state.gateway.endpoints.app_verify_token.clone();
    verify_with_token(&state, kind, token.as_deref(), &params)
}

/// Payload delivery to an app-level callback URL.
pub async fn generic_webhook_handler(
    Path(channel): Path<String>,
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> impl IntoResponse {
    let kind = match parse_channel(&channel) {
        Ok(k) => k,
        Err(_) => return (StatusCode::NOT_FOUND, ack()),
    };
    debug!(channel, "generic webhook received");
    state.gateway.queue.enqueue(IngestJob::Generic { kind, raw });
    (StatusCode::OK, ack())
}

fn verify_with_token(
    state: &AppState,
    kind: ChannelKind,
    token: Option<&str>,
    params: &HashMap<String, String>,
) -> (StatusCode, String) {
    let Some(token) = token else {
        debug!(channel = %kind, "webhook verify: no verify token configured");
        return (StatusCode::FORBIDDEN, String::new());
    };
    let Some(adapter) = state.gateway.adapters.get(kind) else {
        return (StatusCode::NOT_FOUND, String::new());
    };
    match adapter.verify_challenge(params, token) {
        Some(challenge) => (StatusCode::OK, challenge),
        None => {
            warn!(channel = %kind, "webhook verify: challenge rejected");
            (StatusCode::FORBIDDEN, String::new())
        },
    }
}
