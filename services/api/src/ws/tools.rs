//! Tool dispatch for model-initiated tool calls.
//!
//! Every handler acknowledges its call upstream before touching the client, so
//! the upstream turn never waits on client I/O.

use super::{client::ClientSink, protocol::ServerMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fieldcall_core::{ToolCall, ToolResponse};
use gemini_realtime::Upstream;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};

pub const WRITE_TEXT: &str = "write_text";
pub const END_CALL: &str = "end_call";

/// Reason forwarded to the client when the model ends the call without one.
pub const DEFAULT_END_REASON: &str = "The assistant ended the call.";

/// Runs one named tool.
///
/// Implementations must send exactly one [`ToolResponse`] upstream, before any other side effect.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        call: &ToolCall,
        client: &dyn ClientSink,
        upstream: &dyn Upstream,
    ) -> Result<()>;
}

/// Shows `args.text` on the client.
pub struct WriteText;

#[async_trait]
impl ToolHandler for WriteText {
    async fn handle(
        &self,
        call: &ToolCall,
        client: &dyn ClientSink,
        upstream: &dyn Upstream,
    ) -> Result<()> {
        let Some(text) = call.str_arg("text") else {
            upstream
                .send_tool_response(ToolResponse::failure(call, "Missing required argument: text"))
                .await?;
            return Ok(());
        };

        upstream
            .send_tool_response(ToolResponse::success(call, "displayed"))
            .await
            .context("Failed to acknowledge write_text")?;
        client
            .send(ServerMessage::ToolText {
                data: text.to_string(),
            })
            .await
    }
}

/// Tells the client the assistant is hanging up.
pub struct EndCall;

#[async_trait]
impl ToolHandler for EndCall {
    async fn handle(
        &self,
        call: &ToolCall,
        client: &dyn ClientSink,
        upstream: &dyn Upstream,
    ) -> Result<()> {
        upstream
            .send_tool_response(ToolResponse::success(call, "ended"))
            .await
            .context("Failed to acknowledge end_call")?;
        let reason = call
            .str_arg("reason")
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or(DEFAULT_END_REASON);
        client
            .send(ServerMessage::EndCall {
                data: reason.to_string(),
            })
            .await
    }
}

pub struct ToolDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// A dispatcher with `write_text` and `end_call` registered.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(WRITE_TEXT, Arc::new(WriteText));
        dispatcher.register(END_CALL, Arc::new(EndCall));
        dispatcher
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Runs the handler for `call.name`.
    ///
    /// Unknown tools are answered with an error response. Handler failures are
    /// only logged; no second response is synthesized.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        client: &dyn ClientSink,
        upstream: &dyn Upstream,
        session_id: &str,
    ) {
        let Some(handler) = self.handlers.get(&call.name) else {
            warn!(client_id = %session_id, tool = %call.name, "Model called an unknown tool");
            let response =
                ToolResponse::failure(call, format!("Tool not implemented: {}", call.name));
            if let Err(e) = upstream.send_tool_response(response).await {
                error!(client_id = %session_id, tool = %call.name, error = ?e, "Failed to reject unknown tool");
            }
            return;
        };

        info!(client_id = %session_id, tool = %call.name, id = %call.id, "Dispatching tool call");
        if let Err(e) = handler.handle(call, client, upstream).await {
            error!(client_id = %session_id, tool = %call.name, error = ?e, "Tool handler failed");
        }
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_support::{Event, FakeClient, FakeUpstream, log};
    use serde_json::{Map, json};

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        let arguments: Map<String, serde_json::Value> = serde_json::from_value(args).unwrap();
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_write_text_acks_before_display() {
        let log = log();
        let client = FakeClient::new(log.clone());
        let upstream = FakeUpstream::new(log.clone());
        let dispatcher = ToolDispatcher::with_defaults();

        dispatcher
            .dispatch(&call("1", WRITE_TEXT, json!({"text": "ABC"})), &client, &upstream, "c1")
            .await;

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::ToolResponse(response) => {
                assert_eq!(response.id, "1");
                assert!(response.response.rendered);
            }
            other => panic!("expected ack first, got {other:?}"),
        }
        assert_eq!(
            events[1],
            Event::Client(ServerMessage::ToolText { data: "ABC".into() })
        );
    }

    #[tokio::test]
    async fn test_write_text_without_text_is_rejected() {
        let log = log();
        let client = FakeClient::new(log.clone());
        let upstream = FakeUpstream::new(log.clone());

        ToolDispatcher::with_defaults()
            .dispatch(&call("2", WRITE_TEXT, json!({})), &client, &upstream, "c1")
            .await;

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ToolResponse(response) => {
                assert!(!response.response.rendered);
                assert_eq!(response.response.state, "error");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_end_call_uses_default_reason() {
        let log = log();
        let client = FakeClient::new(log.clone());
        let upstream = FakeUpstream::new(log.clone());
        let dispatcher = ToolDispatcher::with_defaults();

        dispatcher
            .dispatch(&call("3", END_CALL, json!({})), &client, &upstream, "c1")
            .await;
        dispatcher
            .dispatch(&call("4", END_CALL, json!({"reason": "Job done"})), &client, &upstream, "c1")
            .await;

        let events = log.lock().unwrap().clone();
        assert!(matches!(events[0], Event::ToolResponse(_)));
        assert_eq!(
            events[1],
            Event::Client(ServerMessage::EndCall {
                data: DEFAULT_END_REASON.into()
            })
        );
        assert!(matches!(events[2], Event::ToolResponse(_)));
        assert_eq!(
            events[3],
            Event::Client(ServerMessage::EndCall {
                data: "Job done".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_still_gets_a_response() {
        let log = log();
        let client = FakeClient::new(log.clone());
        let upstream = FakeUpstream::new(log.clone());

        ToolDispatcher::with_defaults()
            .dispatch(&call("9", "teleport", json!({})), &client, &upstream, "c1")
            .await;

        let events = log.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ToolResponse(response) => {
                assert_eq!(response.id, "9");
                assert_eq!(
                    response.response.error.as_ref().map(|e| e.message.as_str()),
                    Some("Tool not implemented: teleport")
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_failure_is_not_answered_twice() {
        let log = log();
        let client = FakeClient::new(log.clone());
        client.close(1000, "gone").await;
        let upstream = FakeUpstream::new(log.clone());

        ToolDispatcher::with_defaults()
            .dispatch(&call("5", WRITE_TEXT, json!({"text": "late"})), &client, &upstream, "c1")
            .await;

        let responses = log
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, Event::ToolResponse(_)))
            .count();
        assert_eq!(responses, 1);
    }
}
