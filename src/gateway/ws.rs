//! WebSocket transport between clients and the arena core
//!
//! One socket is one connection. Identity comes from the upgrade query string;
//! every inbound text frame is parsed into a [`ClientEvent`] and forwarded to
//! the core, and every event routed to the connection's outbound channel is
//! written back as a text frame.

use crate::notifier::{ChannelNotifier, ClientNotifier};
use crate::persistence::PersistenceGateway;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::service::app::{CoreCommand, ServiceHandle};
use crate::types::{ConnectionId, RoomId};
use crate::utils::generate_connection_id;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Connection parameters carried on the upgrade request
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub reconnect_token: Option<String>,
}

impl ConnectParams {
    /// Reconnection credentials, when both halves are present
    pub fn rejoin(&self) -> Option<(RoomId, String)> {
        match (self.room_id, &self.reconnect_token) {
            (Some(room_id), Some(token)) if !token.is_empty() => Some((room_id, token.clone())),
            _ => None,
        }
    }
}

/// Shared state of the gateway routes
#[derive(Clone)]
pub struct GatewayState {
    service: ServiceHandle,
    notifier: Arc<ChannelNotifier>,
    persistence: Arc<dyn PersistenceGateway>,
}

impl GatewayState {
    pub fn new(
        service: ServiceHandle,
        notifier: Arc<ChannelNotifier>,
        persistence: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            service,
            notifier,
            persistence,
        }
    }
}

/// Build the gateway router
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(mut socket: WebSocket, params: ConnectParams, state: GatewayState) {
    let rejoin = params.rejoin();
    let identity = match state
        .persistence
        .get_or_create_player(
            params.player_id,
            params.session_token,
            params.nickname.unwrap_or_default(),
        )
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            error!("Failed to resolve player identity: {}", e);
            let _ = send_event(&mut socket, &ServerEvent::notice("Could not load your profile"))
                .await;
            return;
        }
    };

    let connection_id = generate_connection_id();
    let mut outbound = state.notifier.register(connection_id);
    info!(
        "Connection {} opened for player {}",
        connection_id, identity.player.id
    );

    if let Err(e) = state.service.send(CoreCommand::Connect {
        connection_id,
        identity,
        rejoin,
    }) {
        warn!("Rejecting connection {}: {}", connection_id, e);
        state.notifier.unregister(connection_id);
        let _ = send_event(&mut socket, &ServerEvent::notice("Server is shutting down")).await;
        return;
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&state, connection_id, text.as_str()) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Connection {} read failed: {}", connection_id, e);
                    break;
                }
            },
            event = outbound.recv() => match event {
                Some(event) => {
                    if let Err(e) = send_event(&mut socket, &event).await {
                        debug!("Connection {} write failed: {}", connection_id, e);
                        break;
                    }
                }
                None => break,
            },
        }
    }

    state.notifier.unregister(connection_id);
    if state
        .service
        .send(CoreCommand::Disconnect { connection_id })
        .is_err()
    {
        debug!("Core already stopped when {} closed", connection_id);
    }
    info!("Connection {} closed", connection_id);
}

/// Parse one frame and hand it to the core; false once the core is gone
fn forward(state: &GatewayState, connection_id: ConnectionId, text: &str) -> bool {
    match ClientEvent::parse(text) {
        Ok(event) => state
            .service
            .send(CoreCommand::Event {
                connection_id,
                event,
            })
            .is_ok(),
        Err(e) => {
            debug!("Connection {} sent a bad frame: {}", connection_id, e);
            state
                .notifier
                .send(connection_id, ServerEvent::notice(e.to_string()));
            true
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<()> {
    let json = event.to_json()?;
    socket
        .send(Message::Text(json.into()))
        .await
        .context("websocket send failed")
}

/// Client-facing WebSocket server
pub struct GatewayServer {
    address: String,
    state: GatewayState,
    shutdown_tx: broadcast::Sender<()>,
}

impl GatewayServer {
    pub fn new(address: String, state: GatewayState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            address,
            state,
            shutdown_tx,
        }
    }

    /// Accept connections until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = self
            .address
            .parse()
            .with_context(|| format!("Invalid gateway address {}", self.address))?;
        let listener = TcpListener::bind(addr).await?;
        info!("Client gateway listening on ws://{}/ws", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Client gateway shutdown signal received");
            })
            .await?;

        info!("Client gateway stopped");
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        if self.shutdown_tx.send(()).is_err() {
            debug!("Client gateway was not listening");
        }
        Ok(())
    }
}
