//! WebSocket upgrade handlers and connection lifecycle.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use herald_core::types::{RecordId, TenantId};
use herald_store::DeliveryStore;

use crate::auth::HubAuth;
use crate::chat::ChatService;
use crate::connection::{
    CLOSE_IDLE, CLOSE_TENANT_MISMATCH, CLOSE_UNAUTHORIZED, ConnectionKind, ConnectionRegistry,
    ConnectionState,
};
use crate::message::{NotificationClientFrame, ServerFrame};

/// Shared hub state behind the WebSocket routes.
pub struct HubState {
    /// Token validator.
    pub auth: HubAuth,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Chat frame handling.
    pub chat: Arc<ChatService>,
    /// Delivery store for unread counts and mark-read.
    pub deliveries: Arc<dyn DeliveryStore>,
    /// Per-connection outbound buffer capacity.
    pub buffer_size: usize,
}

/// Query parameters for a WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Access token issued by the identity service.
    #[serde(default)]
    pub token: Option<String>,
}

/// Builds the hub router with both WebSocket paths.
pub fn hub_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws/notifications/{tenant}", get(notifications_handler))
        .route("/ws/chat/{tenant}", get(chat_handler))
        .with_state(state)
}

async fn notifications_handler(
    ws: WebSocketUpgrade,
    Path(tenant): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, ConnectionKind::Notifications, tenant, query.token, state)
    })
}

async fn chat_handler(
    ws: WebSocketUpgrade,
    Path(tenant): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, ConnectionKind::Chat, tenant, query.token, state)
    })
}

async fn handle_socket(
    mut socket: WebSocket,
    kind: ConnectionKind,
    path_tenant: String,
    token: Option<String>,
    state: Arc<HubState>,
) {
    let claims = match token.as_deref().map(|t| state.auth.validate(t)) {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            warn!(error = %e, "WebSocket token rejected");
            close_with(&mut socket, CLOSE_UNAUTHORIZED, "invalid token").await;
            return;
        }
        None => {
            warn!("WebSocket connection without token");
            close_with(&mut socket, CLOSE_UNAUTHORIZED, "token required").await;
            return;
        }
    };

    if claims.tenant_id != path_tenant {
        warn!(
            path_tenant = %path_tenant,
            token_tenant = %claims.tenant_id,
            "WebSocket tenant mismatch"
        );
        close_with(&mut socket, CLOSE_TENANT_MISMATCH, "tenant mismatch").await;
        return;
    }

    let tenant_id = TenantId::new(path_tenant);
    let (tx, mut rx) = mpsc::channel::<String>(state.buffer_size);
    let conn = state.registry.register(ConnectionState::new(
        tenant_id.clone(),
        claims.sub.clone(),
        kind,
        tx,
    ));
    let conn_id = conn.read().id;
    info!(%conn_id, tenant_id = %tenant_id, user_id = %claims.sub, "WebSocket connected");

    let (close_signal, close_code) = {
        let guard = conn.read();
        (Arc::clone(&guard.close), Arc::clone(&guard.close_code))
    };

    let (mut ws_tx, mut ws_rx) = socket.split();

    let greeting = ServerFrame::ConnectionEstablished {
        user_id: claims.sub.clone(),
        tenant_id: tenant_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    if ws_tx
        .send(Message::Text(greeting.to_text().into()))
        .await
        .is_err()
    {
        state.registry.unregister(conn_id);
        return;
    }

    // Forward task: drains the bounded buffer onto the socket, or sends
    // the close frame when the registry force-closes the connection.
    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                () = close_signal.notified() => {
                    let code = close_code.load(Ordering::Relaxed);
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: "".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        let Ok(message) = result else { break };
        conn.write().touch();

        match message {
            Message::Text(text) => match kind {
                ConnectionKind::Notifications => {
                    handle_notification_frame(&state, &conn, &text).await;
                }
                ConnectionKind::Chat => match serde_json::from_str(&text) {
                    Ok(frame) => state.chat.handle(&conn, frame).await,
                    Err(e) => {
                        debug!(%conn_id, error = %e, "Unparseable chat frame");
                        send_error(&conn, &format!("invalid frame: {e}")).await;
                    }
                },
            },
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
            Message::Binary(_) => {
                send_error(&conn, "binary frames are not supported").await;
            }
        }
    }

    info!(%conn_id, "WebSocket disconnected");
    state.registry.unregister(conn_id);
    send_task.abort();
}

async fn handle_notification_frame(
    state: &Arc<HubState>,
    conn: &Arc<parking_lot::RwLock<ConnectionState>>,
    text: &str,
) {
    let frame: NotificationClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            send_error(conn, &format!("invalid frame: {e}")).await;
            return;
        }
    };

    match frame {
        NotificationClientFrame::Ping { timestamp } => {
            send_frame(
                conn,
                &ServerFrame::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis(),
                },
            )
            .await;
        }
        NotificationClientFrame::MarkRead { notification_id } => {
            let tenant_id = conn.read().tenant_id.clone();
            match state
                .deliveries
                .mark_read(&tenant_id, &RecordId::new(notification_id.clone()))
                .await
            {
                Ok(()) => {
                    send_frame(conn, &ServerFrame::MarkedRead { notification_id }).await;
                }
                Err(e) => send_error(conn, &e.to_string()).await,
            }
        }
        NotificationClientFrame::GetUnreadCount => {
            let (tenant_id, user_id) = {
                let guard = conn.read();
                (guard.tenant_id.clone(), guard.user_id.clone())
            };
            match state.deliveries.count_unread_inapp(&tenant_id, &user_id).await {
                Ok(count) => send_frame(conn, &ServerFrame::UnreadCount { count }).await,
                Err(e) => send_error(conn, &e.to_string()).await,
            }
        }
    }
}

async fn send_frame(conn: &Arc<parking_lot::RwLock<ConnectionState>>, frame: &ServerFrame) {
    let sender = conn.read().sender.clone();
    let _ = sender.send(frame.to_text()).await;
}

async fn send_error(conn: &Arc<parking_lot::RwLock<ConnectionState>>, message: &str) {
    send_frame(
        conn,
        &ServerFrame::Error {
            message: message.to_string(),
        },
    )
    .await;
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Spawns the idle sweep: connections silent past the timeout are closed.
pub fn spawn_idle_sweeper(
    registry: Arc<ConnectionRegistry>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = idle_timeout / 2;
        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for id in registry.timed_out(idle_timeout) {
                debug!(%id, "Closing idle connection");
                registry.kill(id, CLOSE_IDLE);
            }
        }
    })
}
