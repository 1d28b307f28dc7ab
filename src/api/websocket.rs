//! WebSocket notification gateway.
//!
//! Pushes every risk-change notification of one tenant to the connected
//! client, with a heartbeat every 30s.
//!
//! Connection lifecycle:
//! 1. Client opens `GET /ws/tenants/:tenant_id/notifications`
//! 2. Server subscribes to the tenant channel, upgrades, sends Welcome
//! 3. Notifications are forwarded as `RiskChange` messages
//! 4. Heartbeat every 30s; 3 missed = disconnect
//! 5. A client that falls behind the channel gets a `Lagged` notice; the
//!    dropped notifications are not replayed

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{RiskChangeNotification, DISCLAIMER};

/// Heartbeat interval: server sends Heartbeat every 30 seconds.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Disconnect after this many unanswered heartbeats (3 × 30s = 90s).
const MAX_MISSED_HEARTBEATS: u32 = 3;

/// Messages sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutgoing {
    Welcome {
        tenant_id: String,
        session_id: String,
        disclaimer: String,
    },
    RiskChange(RiskChangeNotification),
    Heartbeat { server_time: String },
    /// The client fell behind and `missed` notifications were dropped.
    Lagged { missed: u64 },
}

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum WsIncoming {
    Pong {},
}

// ═══════════════════════════════════════════════════════════
// Heartbeat bookkeeping
// ═══════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
pub(crate) enum HeartbeatAction {
    SendHeartbeat,
    HeartbeatTimeout,
}

#[derive(Debug, Default)]
pub(crate) struct HeartbeatState {
    missed: u32,
}

impl HeartbeatState {
    fn on_pong(&mut self) {
        self.missed = 0;
    }

    fn on_tick(&mut self) -> HeartbeatAction {
        if self.missed >= MAX_MISSED_HEARTBEATS {
            return HeartbeatAction::HeartbeatTimeout;
        }
        self.missed += 1;
        HeartbeatAction::SendHeartbeat
    }
}

/// WebSocket upgrade handler. Subscribes before upgrading so no
/// notification published after the handshake is missed.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<ApiContext>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if tenant_id.trim().is_empty() {
        return Err(ApiError::BadRequest("tenant_id must not be empty".into()));
    }
    let rx = ctx.notifications.subscribe(&tenant_id)?;
    tracing::info!(tenant_id = %tenant_id, "Notification stream accepted");
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, rx, tenant_id)))
}

/// Spawns a sender task for channel→WS forwarding, then runs the
/// receive + notification + heartbeat loop until disconnect.
async fn handle_ws(
    socket: WebSocket,
    mut notifications: broadcast::Receiver<Arc<RiskChangeNotification>>,
    tenant_id: String,
) {
    let (ws_sink, mut ws_stream) = socket.split();
    let (tx, rx) = mpsc::channel::<WsOutgoing>(64);

    let sender_handle = tokio::spawn(async move {
        let mut sink = ws_sink;
        let mut rx = rx;
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let session_id = uuid::Uuid::new_v4().to_string();
    let _ = tx
        .send(WsOutgoing::Welcome {
            tenant_id: tenant_id.clone(),
            session_id: session_id.clone(),
            disclaimer: DISCLAIMER.to_string(),
        })
        .await;

    let mut heartbeat_state = HeartbeatState::default();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // Consume initial immediate tick

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(ref text))) => {
                        if let Ok(WsIncoming::Pong {}) = serde_json::from_str::<WsIncoming>(text) {
                            heartbeat_state.on_pong();
                        }
                    }
                    Some(Ok(Message::Pong(_))) => heartbeat_state.on_pong(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ping handled by axum/tungstenite
                }
            }
            received = notifications.recv() => {
                let outgoing = match received {
                    Ok(notification) => WsOutgoing::RiskChange(RiskChangeNotification::clone(&notification)),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(
                            tenant_id = %tenant_id,
                            session_id = %session_id,
                            missed,
                            "Notification subscriber lagged"
                        );
                        WsOutgoing::Lagged { missed }
                    }
                    Err(RecvError::Closed) => break,
                };
                if tx.send(outgoing).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                match heartbeat_state.on_tick() {
                    HeartbeatAction::HeartbeatTimeout => {
                        tracing::info!(
                            tenant_id = %tenant_id,
                            "{MAX_MISSED_HEARTBEATS} missed heartbeats, disconnecting"
                        );
                        break;
                    }
                    HeartbeatAction::SendHeartbeat => {
                        let _ = tx.send(WsOutgoing::Heartbeat {
                            server_time: chrono::Utc::now().to_rfc3339(),
                        }).await;
                    }
                }
            }
        }
    }

    // Cleanup: drop sender (stops sender task)
    drop(tx);
    let _ = sender_handle.await;

    tracing::info!(tenant_id = %tenant_id, session_id = %session_id, "Notification stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_times_out_after_three_misses() {
        let mut state = HeartbeatState::default();
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::HeartbeatTimeout);
    }

    #[test]
    fn pong_resets_missed_counter() {
        let mut state = HeartbeatState::default();
        state.on_tick();
        state.on_tick();
        state.on_pong();
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::SendHeartbeat);
        assert_eq!(state.on_tick(), HeartbeatAction::HeartbeatTimeout);
    }

    #[test]
    fn outgoing_messages_are_type_tagged() {
        let json = serde_json::to_value(WsOutgoing::Lagged { missed: 4 }).unwrap();
        assert_eq!(json["type"], "Lagged");
        assert_eq!(json["missed"], 4);
        let pong: WsIncoming = serde_json::from_str(r#"{"type":"Pong"}"#).unwrap();
        assert!(matches!(pong, WsIncoming::Pong {}));
    }

    // ═══════════════════════════════════════════════════════════
    // Integration tests: full WebSocket connection lifecycle
    // ═══════════════════════════════════════════════════════════

    use crate::api::router::api_router;
    use crate::broadcast::TenantBroadcaster;
    use crate::config::EngineConfig;
    use crate::engine::RiskEngine;
    use crate::models::ChangeType;
    use crate::persistence::{MemoryAssessmentStore, MemoryAuditTrail};
    use tokio::net::TcpListener;

    /// Start a test server and return the base ws URL, the shared context
    /// and the server handle.
    async fn setup_ws_server() -> (String, ApiContext, tokio::task::JoinHandle<()>) {
        let notifications = Arc::new(TenantBroadcaster::default());
        let engine = Arc::new(RiskEngine::new(
            Arc::new(MemoryAssessmentStore::new()),
            Arc::new(MemoryAuditTrail::new()),
            notifications.clone(),
            EngineConfig::default(),
        ));
        let ctx = ApiContext::new(engine, notifications);
        let app = api_router(ctx.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("ws://127.0.0.1:{}", addr.port()), ctx, handle)
    }

    async fn next_json<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures_util::Stream<
                Item = Result<
                    tokio_tungstenite::tungstenite::Message,
                    tokio_tungstenite::tungstenite::Error,
                >,
            > + Unpin,
    {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("WS error");
        let text = msg.into_text().expect("not text");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn ws_connect_receives_welcome_message() {
        let (base, _ctx, server) = setup_ws_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{base}/ws/tenants/t-1/notifications"))
            .await
            .expect("WS connect failed");

        let welcome = next_json(&mut ws).await;
        assert_eq!(welcome["type"], "Welcome");
        assert_eq!(welcome["tenant_id"], "t-1");
        assert_eq!(welcome["disclaimer"], DISCLAIMER);

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn critical_change_is_pushed_to_tenant_subscriber() {
        let (base, ctx, server) = setup_ws_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{base}/ws/tenants/t-1/notifications"))
            .await
            .expect("WS connect failed");
        let _ = next_json(&mut ws).await; // Welcome

        ctx.engine
            .queue_risk_update("p-1", "t-1", ChangeType::Vitals, serde_json::json!({"blood_pressure": "200/120"}))
            .unwrap();

        let pushed = next_json(&mut ws).await;
        assert_eq!(pushed["type"], "RiskChange");
        assert_eq!(pushed["patient_id"], "p-1");
        assert_eq!(pushed["disclaimer"], DISCLAIMER);
        assert!(pushed["priority"] == "CRITICAL" || pushed["priority"] == "HIGH");

        let _ = ws.close(None).await;
        server.abort();
    }

    #[tokio::test]
    async fn other_tenants_notifications_are_not_delivered() {
        let (base, ctx, server) = setup_ws_server().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{base}/ws/tenants/t-2/notifications"))
            .await
            .expect("WS connect failed");
        let _ = next_json(&mut ws).await; // Welcome

        ctx.engine
            .queue_risk_update("p-1", "t-1", ChangeType::Vitals, serde_json::json!({"blood_pressure": "200/120"}))
            .unwrap();

        let nothing = tokio::time::timeout(Duration::from_millis(500), ws.next()).await;
        assert!(nothing.is_err(), "t-2 subscriber must not see t-1 notifications");

        let _ = ws.close(None).await;
        server.abort();
    }
}
