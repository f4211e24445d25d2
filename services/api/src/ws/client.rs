//! The client-facing half of a relay session.

use super::protocol::ServerMessage;
use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, stream::SplitSink};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Close code sent when the first message is not a configuration.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Close code sent when a client id is already live.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code sent when the upstream session cannot be established.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Where relay events for one client go.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send(&self, msg: ServerMessage) -> Result<()>;
    fn is_open(&self) -> bool;
    async fn close(&self, code: u16, reason: &str);
}

/// [`ClientSink`] over the sending half of an axum WebSocket.
pub struct WsClient {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    /// Cleared when the peer is gone or a close was requested; events stop flowing.
    open: AtomicBool,
    /// Set once our close frame (or the reply to the peer's) has been written.
    close_sent: AtomicBool,
}

impl WsClient {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            open: AtomicBool::new(true),
            close_sent: AtomicBool::new(false),
        }
    }

    /// Stops event delivery once the receiving half ends. A later [`ClientSink::close`]
    /// still writes the close frame, which also flushes the reply to a peer-initiated close.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientSink for WsClient {
    async fn send(&self, msg: ServerMessage) -> Result<()> {
        if !self.is_open() {
            bail!("client socket is closed");
        }
        let serialized = serde_json::to_string(&msg)?;
        let result = self
            .sink
            .lock()
            .await
            .send(Message::Text(serialized.into()))
            .await;
        if let Err(e) = result {
            self.mark_closed();
            return Err(e.into());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self, code: u16, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.sink.lock().await.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Client close frame could not be sent");
        }
    }
}
