//! WebSocket connection lifecycle.
//!
//! Each connection gets two halves: a spawned write task draining the
//! connection's event channel into the socket (plus periodic pings), and the
//! read loop below. The first frame must be `connect { token }` within the
//! configured deadline — anything else closes the socket without registering
//! a handle. After authentication every text frame is parsed and handed to
//! the dispatcher; replies and errors go back through the event channel so
//! ordering with fan-out events is preserved.
//!
//! Disconnect is the cancellation signal: the handle is unregistered, and
//! when it was the identity's last one the room rosters are walked for the
//! implicit leave.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::error::GatewayError;
use crate::backend::registry::EventSender;
use crate::backend::server::state::AppState;
use crate::shared::{ClientFrame, Identity, ServerEvent};

use super::dispatch::{dispatch, ConnContext};

const PING_INTERVAL_SECS: u64 = 30;
const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Handle WebSocket upgrade (GET /ws).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    debug!(%addr, "websocket connection opened");

    // Write half: forward events from the connection channel, keep the
    // socket alive with pings.
    let forward_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(std::time::Duration::from_secs(PING_INTERVAL_SECS));
        ping.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            let text = match serde_json::to_string(&event) {
                                Ok(text) => text,
                                Err(e) => {
                                    warn!(error = %e, "failed to serialize outbound event");
                                    continue;
                                }
                            };
                            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping.tick() => {
                    if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Authentication phase: the first frame decides whether a handle is
    // registered at all.
    let identity = match authenticate(&state, &mut ws_receiver, &tx).await {
        Some(identity) => identity,
        None => {
            debug!(%addr, "connection closed before authentication");
            // Let the write task flush the error frame before going away.
            drop(tx);
            flush_writer(forward_task).await;
            return;
        }
    };

    let conn_id = Uuid::new_v4();
    state
        .registry
        .register(identity.clone(), conn_id, tx.clone())
        .await;
    info!(user = %identity.id, conn = %conn_id, %addr, "client authenticated");

    let _ = tx.send(ServerEvent::ConnectOk {
        identity: identity.clone(),
        online: state.registry.list_online().await,
    });

    let ctx = ConnContext { conn_id, identity };

    // Main receive loop.
    while let Some(incoming) = ws_receiver.next().await {
        match incoming {
            Ok(Message::Text(text)) => {
                let frame = match serde_json::from_str::<ClientFrame>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(%addr, error = %e, "malformed frame");
                        let err = GatewayError::invalid_argument("malformed frame");
                        let _ = tx.send(err.to_event(None));
                        continue;
                    }
                };

                let event_name = frame.event_name();
                match dispatch(&state, &ctx, frame).await {
                    Ok(Some(reply)) => {
                        let _ = tx.send(reply);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let fatal = err.is_fatal();
                        let _ = tx.send(err.to_event(Some(event_name)));
                        if fatal {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            // axum answers pings itself; binary frames are not part of the
            // protocol.
            Ok(_) => {}
            Err(e) => {
                debug!(%addr, error = %e, "websocket error");
                break;
            }
        }
    }

    // Teardown: unregister the handle; when it was the identity's last one,
    // walk the rooms it was in.
    if let Some((user_id, went_offline)) = state.registry.unregister(conn_id).await {
        if went_offline {
            state.rooms.disconnect_cleanup(user_id).await;
        }
        info!(user = %user_id, conn = %conn_id, went_offline, "client disconnected");
    }
    drop(tx);
    flush_writer(forward_task).await;
}

/// Wait for the write task to drain its channel, aborting it if the peer
/// stopped reading.
async fn flush_writer(forward_task: tokio::task::JoinHandle<()>) {
    let abort = forward_task.abort_handle();
    if tokio::time::timeout(FLUSH_TIMEOUT, forward_task).await.is_err() {
        abort.abort();
    }
}

/// Drive the authentication phase.
///
/// Waits (bounded by the configured deadline) for a `connect` frame and
/// verifies its token. Returns `None` when the connection must close: no
/// handle has been registered at that point, so there is nothing to undo.
async fn authenticate(
    state: &AppState,
    ws_receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    tx: &EventSender,
) -> Option<Identity> {
    let deadline = tokio::time::Instant::now() + state.config.auth_deadline;

    loop {
        let incoming = match tokio::time::timeout_at(deadline, ws_receiver.next()).await {
            Ok(incoming) => incoming,
            Err(_) => {
                warn!("authentication deadline expired");
                let err = GatewayError::Unauthenticated("authentication timed out".into());
                let _ = tx.send(err.to_event(Some("connect")));
                return None;
            }
        };

        let message = match incoming {
            Some(Ok(message)) => message,
            Some(Err(_)) | None => return None,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return None,
            // Ignore control frames while waiting for connect.
            _ => continue,
        };

        let token = match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(ClientFrame::Connect { token }) => token,
            _ => {
                let err =
                    GatewayError::Unauthenticated("expected a connect frame".into());
                let _ = tx.send(err.to_event(Some("connect")));
                return None;
            }
        };

        match state.issuer.verify(&token).await {
            Ok(identity) => return Some(identity),
            Err(err) => {
                warn!(error = %err, "authentication failed");
                let _ = tx.send(err.to_event(Some("connect")));
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::stream;

    use crate::backend::auth::{create_token, JwtIssuer};
    use crate::backend::calls::CallSignalingRelay;
    use crate::backend::messaging::{DirectMessagingService, MemoryConversationStore};
    use crate::backend::registry::ConnectionRegistry;
    use crate::backend::rooms::{GroupRoomManager, MemoryGroupStore};
    use crate::backend::server::config::GatewayConfig;

    const SECRET: &str = "socket-test-secret";

    fn test_state(auth_deadline: Duration) -> AppState {
        let config = Arc::new(GatewayConfig {
            bind_addr: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            jwt_secret: SECRET.into(),
            auth_deadline,
            store_timeout: Duration::from_secs(1),
            delete_grace: Duration::from_secs(300),
        });
        let registry = Arc::new(ConnectionRegistry::new());
        AppState {
            messaging: Arc::new(DirectMessagingService::new(
                Arc::new(MemoryConversationStore::new()),
                registry.clone(),
                config.store_timeout,
            )),
            rooms: Arc::new(GroupRoomManager::new(
                Arc::new(MemoryGroupStore::new()),
                registry.clone(),
                config.store_timeout,
                config.delete_grace,
            )),
            calls: Arc::new(CallSignalingRelay::new(registry.clone())),
            issuer: Arc::new(JwtIssuer::new(SECRET)),
            config,
            registry,
        }
    }

    fn frames(raw: &[&str]) -> impl StreamExt<Item = Result<Message, axum::Error>> + Unpin {
        stream::iter(
            raw.iter()
                .map(|text| Ok(Message::Text((*text).to_string().into())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn valid_connect_yields_the_identity() {
        let state = test_state(Duration::from_secs(5));
        let user = Identity::new(Uuid::new_v4(), "alice");
        let token = create_token(SECRET, &user).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let connect = format!(r#"{{"event":"connect","data":{{"token":"{token}"}}}}"#);
        let mut incoming = frames(&[connect.as_str()]);

        let identity = authenticate(&state, &mut incoming, &tx).await;
        assert_eq!(identity, Some(user));
    }

    #[tokio::test]
    async fn bad_token_is_rejected_with_an_error_frame() {
        let state = test_state(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut incoming =
            frames(&[r#"{"event":"connect","data":{"token":"not.a.token"}}"#]);
        let identity = authenticate(&state, &mut incoming, &tx).await;

        assert_eq!(identity, None);
        match rx.try_recv().unwrap() {
            ServerEvent::Error { code, .. } => assert_eq!(code, "unauthenticated"),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_frame_must_be_connect() {
        let state = test_state(Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut incoming = frames(&[r#"{"event":"presence:list"}"#]);
        let identity = authenticate(&state, &mut incoming, &tx).await;

        assert_eq!(identity, None);
        match rx.try_recv().unwrap() {
            ServerEvent::Error { code, .. } => assert_eq!(code, "unauthenticated"),
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_connection_hits_the_deadline() {
        let state = test_state(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut incoming = stream::pending::<Result<Message, axum::Error>>();
        let identity = authenticate(&state, &mut incoming, &tx).await;

        assert_eq!(identity, None);
        match rx.try_recv().unwrap() {
            ServerEvent::Error { code, .. } => assert_eq!(code, "unauthenticated"),
            other => panic!("expected error frame, got {other:?}"),
        }
    }
}
