//! The two directions of a relay session.
//!
//! Upstream to client: [`run_receive_loop`] reads frames from the AI service,
//! classifies them and drives the turn state machine. Client to upstream:
//! [`run_client_loop`] forwards content once the session is configured.

use super::{
    protocol::{ClientMessage, ServerMessage},
    tools::ToolDispatcher,
};
use crate::registry::Session;
use axum::extract::ws::{Message, WebSocket};
use fieldcall_core::TurnState;
use futures_util::{StreamExt, stream::SplitStream};
use gemini_realtime::{Upstream, types::ServerFrame};
use tracing::{debug, error, info, warn};

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The upstream transport closed.
    UpstreamClosed,
    /// The upstream transport failed.
    UpstreamFailed,
    /// The client went away.
    ClientGone,
}

/// Receives upstream frames until the upstream ends or the client is gone.
pub async fn run_receive_loop(session: &Session, tools: &ToolDispatcher) -> LoopExit {
    let Some(upstream) = session.upstream() else {
        warn!(client_id = %session.id(), "Receive loop started without an upstream session");
        return LoopExit::UpstreamClosed;
    };

    loop {
        if !session.client().is_open() {
            return LoopExit::ClientGone;
        }
        let raw = match upstream.receive().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(client_id = %session.id(), "Upstream closed the session");
                return LoopExit::UpstreamClosed;
            }
            Err(e) => {
                error!(client_id = %session.id(), error = ?e, "Upstream receive failed");
                return LoopExit::UpstreamFailed;
            }
        };
        if !session.client().is_open() {
            return LoopExit::ClientGone;
        }
        process_frame(session, upstream.as_ref(), tools, &raw).await;
    }
}

/// Classifies one upstream frame: tool calls, then interruption, then content, then turn completion.
pub async fn process_frame(
    session: &Session,
    upstream: &dyn Upstream,
    tools: &ToolDispatcher,
    raw: &str,
) {
    let frame: ServerFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(client_id = %session.id(), error = %e, "Skipping unparsable upstream frame");
            return;
        }
    };
    let client = session.client().as_ref();

    if let Some(calls) = frame.tool_calls() {
        for call in calls {
            tools.dispatch(call, client, upstream, session.id()).await;
        }
        return;
    }

    if frame.is_interrupted() {
        info!(client_id = %session.id(), "Upstream reported an interruption");
        session.transition(TurnState::Interrupted);
        notify(session, ServerMessage::Interrupted).await;
        if let Err(e) = upstream.send_end(None).await {
            error!(client_id = %session.id(), error = ?e, "Failed to close the interrupted turn upstream");
        }
        notify(session, ServerMessage::TurnComplete).await;
        session.transition(TurnState::Listening);
        return;
    }

    let turn_complete = frame.is_turn_complete();
    if let Some(parts) = frame.model_parts() {
        if !turn_complete {
            notify(session, ServerMessage::TurnNotComplete).await;
        }
        for part in parts {
            if let Some(text) = &part.text {
                notify(
                    session,
                    ServerMessage::Text {
                        data: text.trim().to_string(),
                        turn_complete,
                    },
                )
                .await;
            } else if let Some(blob) = &part.inline_data {
                debug!(client_id = %session.id(), mime_type = ?blob.mime_type, "Not forwarding inline data");
            }
        }
    }

    if turn_complete {
        session.transition(TurnState::Listening);
        notify(session, ServerMessage::TurnComplete).await;
    }
}

async fn notify(session: &Session, msg: ServerMessage) {
    if let Err(e) = session.client().send(msg).await {
        warn!(client_id = %session.id(), error = %e, "Failed to forward event to client");
    }
}

/// Forwards client frames until the client socket closes or errors.
pub async fn run_client_loop(session: &Session, stream: &mut SplitStream<WebSocket>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_client_frame(session, text.as_str()).await,
            Ok(Message::Close(frame)) => {
                info!(client_id = %session.id(), ?frame, "Client sent close frame");
                break;
            }
            Ok(Message::Binary(data)) => {
                warn!(client_id = %session.id(), len = data.len(), "Ignoring binary client frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!(client_id = %session.id(), error = ?e, "Error receiving from client WebSocket");
                break;
            }
        }
    }
}

/// Handles one client frame after configuration.
pub async fn handle_client_frame(session: &Session, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(client_id = %session.id(), error = %e, "Skipping unparsable client frame");
            return;
        }
    };

    let content = match msg {
        ClientMessage::Config { .. } => {
            warn!(client_id = %session.id(), "Ignoring repeated configuration");
            return;
        }
        ClientMessage::Unknown => {
            warn!(client_id = %session.id(), "Ignoring client frame of unknown kind");
            return;
        }
        content => content,
    };

    let Some(upstream) = session.upstream().filter(|_| session.is_configured()) else {
        warn!(client_id = %session.id(), "Dropping content received before configuration");
        return;
    };

    let result = match content {
        ClientMessage::Text { data } => {
            if !upstream.is_open() {
                warn!(client_id = %session.id(), "Dropping text; upstream is not open");
                return;
            }
            upstream.send_text(&data).await
        }
        ClientMessage::Image { data } => {
            if !upstream.is_open() {
                warn!(client_id = %session.id(), "Dropping image; upstream is not open");
                return;
            }
            upstream.send_image(&data).await
        }
        ClientMessage::Continue { data } => upstream.send_continue(data).await,
        ClientMessage::End { data } => upstream.send_end(data).await,
        ClientMessage::Config { .. } | ClientMessage::Unknown => return,
    };
    if let Err(e) = result {
        warn!(client_id = %session.id(), error = %e, "Failed to forward client content upstream");
    }
}
