//! Gemini Live (BidiGenerateContent) wire types.
//!
//! Outgoing frames use the snake_case field names the service accepts;
//! incoming frames are read in camelCase with snake_case aliases.

use fieldcall_core::{SessionConfig, ToolCall, ToolDeclaration, ToolResponse};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Client -> service ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ClientFrame {
    Setup(Setup),
    ClientContent(ClientContent),
    ToolResponse(ToolResponseBatch),
}

#[derive(Serialize, Debug)]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl Setup {
    /// Builds the text-only setup frame for `config`.
    pub fn new(model: &str, config: &SessionConfig) -> Self {
        let tools = (!config.tools.is_empty()).then(|| {
            vec![Tool {
                function_declarations: config.tools.clone(),
            }]
        });
        Self {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Text],
            },
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text(config.system_prompt.clone())],
            },
            tools,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug)]
pub struct Tool {
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Serialize, Debug)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    InlineData(Blob),
}

#[derive(Serialize, Debug)]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// One user turn, optionally closing it.
#[derive(Serialize, Debug)]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl ClientContent {
    pub fn user(parts: Vec<Part>, turn_complete: bool) -> Self {
        Self {
            turns: vec![Content::user(parts)],
            turn_complete,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ToolResponseBatch {
    pub function_responses: Vec<ToolResponse>,
}

// --- Service -> client ---

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    #[serde(default, alias = "setup_complete")]
    pub setup_complete: Option<Value>,
    #[serde(default, alias = "server_content")]
    pub server_content: Option<ServerContent>,
    #[serde(default, alias = "tool_call")]
    pub tool_call: Option<ToolCallBatch>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default, alias = "turn_complete")]
    pub turn_complete: Option<bool>,
}

impl ServerFrame {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Interruption flag, either top-level or inside `serverContent`.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted == Some(true)
            || self
                .server_content
                .as_ref()
                .is_some_and(|content| content.interrupted == Some(true))
    }

    /// Turn completion flag, either top-level or inside `serverContent`.
    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete == Some(true)
            || self
                .server_content
                .as_ref()
                .is_some_and(|content| content.turn_complete == Some(true))
    }

    pub fn model_parts(&self) -> Option<&[ServerPart]> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()
            .map(|turn| turn.parts.as_slice())
    }

    /// Tool calls in the order the service listed them.
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.tool_call
            .as_ref()
            .map(|batch| batch.function_calls.as_slice())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, alias = "model_turn")]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default, alias = "turn_complete")]
    pub turn_complete: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<ServerPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "inline_data")]
    pub inline_data: Option<ServerBlob>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerBlob {
    #[serde(default, alias = "mime_type")]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBatch {
    #[serde(default, alias = "function_calls")]
    pub function_calls: Vec<ToolCall>,
}
