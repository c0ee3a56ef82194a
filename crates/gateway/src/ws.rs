use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{stream::StreamExt, SinkExt},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use courier_protocol::{
    error_codes, ConnectParams, ErrorShape, EventFrame, HelloOk, RequestFrame, ResponseFrame,
    HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES,
};

use crate::{
    methods,
    state::{ConnectedClient, GatewayState},
};

/// Handle one WebSocket connection through its full lifecycle:
/// handshake (with auth) → request loop → cleanup.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, remote: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %remote, "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards serialized frames to the socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    // ── Handshake phase ──────────────────────────────────────────────────

    let (request_id, params) = match tokio::time::timeout(
        std::time::Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
        wait_for_connect(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(conn_id = %conn_id, error = %e, "ws: handshake failed");
            drop(client_tx);
            write_handle.abort();
            return;
        },
        Err(_) => {
            warn!(conn_id = %conn_id, "ws: handshake timeout");
            drop(client_tx);
            write_handle.abort();
            return;
        },
    };

    let Some(tenant_id) = state.auth.authenticate(&params.token, &params.tenant).await else {
        warn!(conn_id = %conn_id, tenant = %params.tenant, "ws: auth failed");
        let err = ResponseFrame::err(
            &request_id,
            ErrorShape::new(error_codes::AUTH_FAILED, "authentication failed"),
        );
        send_frame(&client_tx, &err);
        drop(client_tx);
        write_handle.abort();
        return;
    };

    let hello = HelloOk::new(conn_id.clone(), tenant_id.clone());
    match serde_json::to_value(&hello) {
        Ok(payload) => send_frame(&client_tx, &ResponseFrame::ok(&request_id, payload)),
        Err(e) => {
            warn!(conn_id = %conn_id, "ws: hello serialization failed: {e}");
            drop(client_tx);
            write_handle.abort();
            return;
        },
    }

    info!(
        conn_id = %conn_id,
        tenant_id = %tenant_id,
        client_version = params.client_version.as_deref().unwrap_or("unknown"),
        "ws: handshake complete"
    );

    state
        .register_client(ConnectedClient {
            conn_id: conn_id.clone(),
            tenant_id: tenant_id.clone(),
            sender: client_tx.clone(),
            connected_at: Instant::now(),
        })
        .await;

    // ── Request loop ─────────────────────────────────────────────────────

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        if text.len() > MAX_PAYLOAD_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "ws: payload too large");
            let err = EventFrame::new(
                "error",
                serde_json::json!({"message": "payload too large", "maxBytes": MAX_PAYLOAD_BYTES}),
                state.next_seq(),
            );
            send_frame(&client_tx, &err);
            continue;
        }

        let req: RequestFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "ws: invalid frame");
                let err = EventFrame::new(
                    "error",
                    serde_json::json!({"message": "invalid frame"}),
                    state.next_seq(),
                );
                send_frame(&client_tx, &err);
                continue;
            },
        };

        debug!(conn_id = %conn_id, request_id = %req.id, method = %req.method, "ws: request");
        let response = methods::dispatch(&state, &tenant_id, req).await;
        send_frame(&client_tx, &response);
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    let duration = state
        .remove_client(&tenant_id, &conn_id)
        .await
        .map(|c| c.connected_at.elapsed())
        .unwrap_or_default();
    info!(
        conn_id = %conn_id,
        duration_secs = duration.as_secs(),
        "ws: connection closed"
    );

    drop(client_tx);
    write_handle.abort();
}

fn send_frame<T: serde::Serialize>(tx: &mpsc::UnboundedSender<String>, frame: &T) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = tx.send(json);
        },
        Err(e) => warn!("ws: frame serialization failed: {e}"),
    }
}

/// Wait for the first `connect` request frame.
async fn wait_for_connect(
    rx: &mut futures::stream::SplitStream<WebSocket>,
) -> anyhow::Result<(String, ConnectParams)> {
    while let Some(msg) = rx.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => anyhow::bail!("connection closed before handshake"),
            _ => continue,
        };

        let req: RequestFrame = serde_json::from_str(&text)?;
        if req.method != "connect" {
            anyhow::bail!("first message must be 'connect', got '{}'", req.method);
        }
        let params: ConnectParams =
            serde_json::from_value(req.params.unwrap_or(serde_json::Value::Null))?;
        return Ok((req.id, params));
    }
    anyhow::bail!("connection closed before handshake")
}
