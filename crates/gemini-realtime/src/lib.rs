//! Client for the Gemini Live bidirectional streaming API.
//!
//! - `transport`: JSON-framed WebSocket adapter with a dedicated reader task.
//! - `types`: the setup, content and tool frames exchanged with the service.
//! - `session`: [`UpstreamSession`], the handshake and content-send operations.

pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{Result, SessionError};
pub use session::{Endpoint, UpstreamSession};

use async_trait::async_trait;
use fieldcall_core::ToolResponse;
use serde_json::Value;

/// The operations a relay performs on its upstream session once connected.
///
/// Sends may be issued concurrently from several tasks; implementations
/// serialize them so frames are never interleaved.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// True only while the transport is open and the session considers itself connected.
    fn is_open(&self) -> bool;

    /// Sends `text` as a complete user turn.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Sends a base64 image as a complete user turn.
    async fn send_image(&self, base64_payload: &str) -> Result<()>;

    /// Sends `envelope` verbatim, or an empty user turn that keeps the turn open.
    async fn send_continue(&self, envelope: Option<Value>) -> Result<()>;

    /// Sends `envelope` verbatim, or an empty user turn that closes the turn.
    async fn send_end(&self, envelope: Option<Value>) -> Result<()>;

    async fn send_tool_response(&self, response: ToolResponse) -> Result<()>;

    /// Waits for the next frame. `Ok(None)` means the transport closed.
    async fn receive(&self) -> Result<Option<String>>;

    /// Closes the connection and waits for the acknowledgment. Idempotent.
    async fn close(&self) -> Result<()>;
}
