//! The single upstream connection a relay session owns.

use crate::{
    Upstream,
    error::{Result, SessionError},
    transport::{Received, WsTransport},
    types::{Blob, ClientContent, ClientFrame, Part, ServerFrame, Setup, ToolResponseBatch},
};
use async_trait::async_trait;
use fieldcall_core::{SessionConfig, ToolResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// MIME type attached to forwarded camera frames.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// Where and with which model an upstream session is opened.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Full WebSocket URL, credentials included.
    pub url: String,
    pub model: String,
}

/// Connection to the generative AI streaming service.
///
/// Lifecycle: [`set_config`](Self::set_config), then [`connect`](Self::connect),
/// after which the session is normally shared behind an `Arc<dyn Upstream>`.
pub struct UpstreamSession {
    endpoint: Endpoint,
    config: Option<SessionConfig>,
    transport: Option<WsTransport>,
    /// Set once the transport opens, cleared on close. A transport can be open
    /// before the service-level setup has run, and stale after a close.
    connected: AtomicBool,
}

impl UpstreamSession {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            config: None,
            transport: None,
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    /// Stores the configuration used by the setup handshake.
    pub fn set_config(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        self.config = Some(config);
        Ok(())
    }

    /// Opens the transport, sends the setup frame and waits for its acknowledgment.
    pub async fn connect(&mut self) -> Result<()> {
        let config = self.config.as_ref().ok_or_else(|| {
            SessionError::Configuration("set_config was never called".to_string())
        })?;
        let setup = ClientFrame::Setup(Setup::new(&self.endpoint.model, config));

        let transport = WsTransport::connect(&self.endpoint.url).await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(model = %self.endpoint.model, tools = config.tools.len(), flags = ?config.flags, "Connected to upstream; sending setup");

        if let Err(e) = handshake(&transport, &setup).await {
            transport.close().await;
            self.connected.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!("Upstream setup complete");
        self.transport = Some(transport);
        Ok(())
    }

    fn open_transport(&self) -> Result<&WsTransport> {
        match &self.transport {
            Some(transport) if self.connected.load(Ordering::SeqCst) && transport.is_open() => {
                Ok(transport)
            }
            _ => Err(SessionError::NotConnected),
        }
    }

    async fn send(&self, frame: &ClientFrame) -> Result<()> {
        self.open_transport()?.send_json(frame).await
    }

    async fn send_envelope(&self, envelope: Option<Value>, turn_complete: bool) -> Result<()> {
        let transport = self.open_transport()?;
        match envelope {
            Some(envelope) => transport.send_json(&envelope).await,
            None => {
                let frame = ClientFrame::ClientContent(ClientContent::user(vec![], turn_complete));
                transport.send_json(&frame).await
            }
        }
    }
}

async fn handshake(transport: &WsTransport, setup: &ClientFrame) -> Result<()> {
    transport.send_json(setup).await?;
    match transport.recv().await {
        Received::Frame(raw) => {
            let ack: ServerFrame = serde_json::from_str(&raw).map_err(|e| {
                SessionError::Protocol(format!("unreadable setup acknowledgment: {e}"))
            })?;
            if ack.is_setup_complete() {
                Ok(())
            } else {
                Err(SessionError::Protocol(format!(
                    "expected setupComplete, got: {raw}"
                )))
            }
        }
        Received::Closed => Err(SessionError::Protocol(
            "transport closed before setup was acknowledged".to_string(),
        )),
        Received::Error(e) => Err(SessionError::Transport(e)),
    }
}

#[async_trait]
impl Upstream for UpstreamSession {
    fn is_open(&self) -> bool {
        self.open_transport().is_ok()
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let frame = ClientFrame::ClientContent(ClientContent::user(
            vec![Part::Text(text.to_string())],
            true,
        ));
        self.send(&frame).await
    }

    async fn send_image(&self, base64_payload: &str) -> Result<()> {
        let frame = ClientFrame::ClientContent(ClientContent::user(
            vec![Part::InlineData(Blob {
                mime_type: IMAGE_MIME_TYPE.to_string(),
                data: base64_payload.to_string(),
            })],
            true,
        ));
        self.send(&frame).await
    }

    async fn send_continue(&self, envelope: Option<Value>) -> Result<()> {
        self.send_envelope(envelope, false).await
    }

    async fn send_end(&self, envelope: Option<Value>) -> Result<()> {
        self.send_envelope(envelope, true).await
    }

    async fn send_tool_response(&self, response: ToolResponse) -> Result<()> {
        debug!(id = %response.id, tool = %response.name, "Sending tool response upstream");
        let frame = ClientFrame::ToolResponse(ToolResponseBatch {
            function_responses: vec![response],
        });
        self.send(&frame).await
    }

    async fn receive(&self) -> Result<Option<String>> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        match transport.recv().await {
            Received::Frame(raw) => Ok(Some(raw)),
            Received::Closed => {
                self.connected.store(false, Ordering::SeqCst);
                Ok(None)
            }
            Received::Error(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(SessionError::Transport(e))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        match &self.transport {
            Some(transport) => {
                if !was_connected {
                    debug!("Upstream already closed; clearing local state");
                }
                transport.close().await;
            }
            None => debug!("Close requested on an upstream session that never connected"),
        }
        Ok(())
    }
}
