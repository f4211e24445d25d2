//! Manages the WebSocket connection lifecycle for one relay session.

use super::{
    client::{
        CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION, CLOSE_PROTOCOL_ERROR, ClientSink, WsClient,
    },
    protocol::{ClientMessage, ServerMessage},
    relay::{run_client_loop, run_receive_loop},
};
use crate::state::AppState;
use anyhow::{Result, anyhow, bail};
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use fieldcall_core::{SessionConfig, TurnState};
use futures_util::{StreamExt, stream::SplitStream};
use gemini_realtime::{Upstream, UpstreamSession};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

const CLOSE_NORMAL: u16 = 1000;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Registers the session, requires a `config` message first, opens the upstream
/// session, then runs both relay directions until either side ends.
#[instrument(name = "ws_session", skip(socket, state))]
async fn handle_socket(socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let ws_client = Arc::new(WsClient::new(sink));
    let client: Arc<dyn ClientSink> = ws_client.clone();

    let session = match state.registry.register(&client_id, client.clone()).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Refusing connection");
            client
                .close(CLOSE_POLICY_VIOLATION, "client id already connected")
                .await;
            return;
        }
    };
    info!("New WebSocket connection. Awaiting configuration...");

    let config = match read_config(&mut stream).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            info!("Client disconnected before sending configuration.");
            state.registry.cleanup(&client_id).await;
            client.close(CLOSE_NORMAL, "session ended").await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "Session initialization failed");
            state.registry.cleanup(&client_id).await;
            client.close(CLOSE_PROTOCOL_ERROR, "expected config").await;
            return;
        }
    };

    let upstream = match open_upstream(&state, config).await {
        Ok(upstream) => upstream,
        Err(e) => {
            error!(error = ?e, "Failed to establish upstream session");
            state.registry.cleanup(&client_id).await;
            report_upstream_failure(client.as_ref()).await;
            return;
        }
    };
    session.attach_upstream(upstream);
    session.transition(TurnState::Listening);

    if let Err(e) = client.send(ServerMessage::Ready).await {
        error!(error = ?e, "Failed to send ready to client");
        state.registry.cleanup(&client_id).await;
        return;
    }
    info!("Session ready");

    tokio::select! {
        exit = run_receive_loop(&session, &state.tools) => {
            info!(?exit, "Upstream receive loop finished");
        }
        _ = run_client_loop(&session, &mut stream) => {
            ws_client.mark_closed();
            info!("Client connection finished");
        }
    }

    state.registry.cleanup(&client_id).await;
    client.close(CLOSE_NORMAL, "session ended").await;
    info!("WebSocket connection closed and session terminated.");
}

/// Sends the `error` event behind the client's error banner, then closes with 1011.
async fn report_upstream_failure(client: &dyn ClientSink) {
    let report = ServerMessage::Error {
        message: "Could not reach the AI service".to_string(),
    };
    if let Err(e) = client.send(report).await {
        warn!(error = %e, "Failed to report the upstream failure to the client");
    }
    client
        .close(CLOSE_INTERNAL_ERROR, "upstream unavailable")
        .await;
}

/// Reads the first client frame, which must be a valid `config` message.
/// `Ok(None)` means the client left first.
async fn read_config(stream: &mut SplitStream<WebSocket>) -> Result<Option<SessionConfig>> {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => return Ok(None),
            Ok(Message::Binary(_)) => bail!("First message was not a text `config` message."),
            Err(e) => {
                warn!(error = %e, "Client socket failed before configuration");
                return Ok(None);
            }
        };
        return match serde_json::from_str::<ClientMessage>(text.as_str())? {
            ClientMessage::Config { config } => {
                config.validate()?;
                info!(
                    tools = config.tools.len(),
                    flags = ?config.flags,
                    "Configuration received"
                );
                Ok(Some(config))
            }
            _ => Err(anyhow!("First message must be `config`.")),
        };
    }
    Ok(None)
}

async fn open_upstream(
    state: &AppState,
    config: SessionConfig,
) -> gemini_realtime::Result<Arc<dyn Upstream>> {
    let mut upstream = UpstreamSession::new(state.config.upstream_endpoint());
    upstream.set_config(config)?;
    upstream.connect().await?;
    Ok(Arc::new(upstream))
}
