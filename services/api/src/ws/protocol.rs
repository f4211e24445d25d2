//! Defines the WebSocket message protocol between the browser client and the relay.

use fieldcall_core::SessionConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from the client (browser) to the relay.
#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Configures the session. This must be the first message.
    Config { config: SessionConfig },
    /// A text message from the technician.
    Text { data: String },
    /// A base64 JPEG camera frame.
    Image { data: String },
    /// Keeps the upstream turn open; `data` is an optional raw upstream envelope.
    Continue {
        #[serde(default)]
        data: Option<Value>,
    },
    /// Closes the upstream turn; `data` is an optional raw upstream envelope.
    End {
        #[serde(default)]
        data: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Messages sent from the relay to the client (browser).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The upstream session is set up and content may flow.
    Ready,
    /// One trimmed text part of the assistant's turn.
    Text {
        data: String,
        #[serde(rename = "turnComplete")]
        turn_complete: bool,
    },
    /// Text the `write_text` tool asked to display.
    ToolText { data: String },
    /// The assistant ended the call.
    EndCall { data: String },
    TurnNotComplete,
    TurnComplete,
    /// Barge-in: the client must flush its playback queue.
    Interrupted,
    /// Reports a fatal error to the client.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_config_message() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "kind": "config",
            "config": {"systemPrompt": "x", "tools": []}
        }))
        .unwrap();
        match msg {
            ClientMessage::Config { config } => {
                assert_eq!(config.system_prompt, "x");
                assert!(config.tools.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parses_content_messages() {
        let text: ClientMessage =
            serde_json::from_value(json!({"kind": "text", "data": "hola"})).unwrap();
        assert!(matches!(text, ClientMessage::Text { data } if data == "hola"));

        let cont: ClientMessage = serde_json::from_value(json!({"kind": "continue"})).unwrap();
        assert!(matches!(cont, ClientMessage::Continue { data: None }));

        let end: ClientMessage =
            serde_json::from_value(json!({"kind": "end", "data": {"client_content": {}}})).unwrap();
        assert!(matches!(end, ClientMessage::End { data: Some(_) }));
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"kind": "audio", "data": "AAAA"})).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn test_server_message_shapes() {
        assert_eq!(
            serde_json::to_value(ServerMessage::Ready).unwrap(),
            json!({"kind": "ready"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Text {
                data: "hi".into(),
                turn_complete: false
            })
            .unwrap(),
            json!({"kind": "text", "data": "hi", "turnComplete": false})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::ToolText { data: "ABC".into() }).unwrap(),
            json!({"kind": "tool_text", "data": "ABC"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::TurnNotComplete).unwrap(),
            json!({"kind": "turn_not_complete"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::Error { message: "boom".into() }).unwrap(),
            json!({"kind": "error", "message": "boom"})
        );
    }
}
