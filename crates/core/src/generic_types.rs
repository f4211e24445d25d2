//! Provider-agnostic session types shared by the relay and the upstream client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A failure to accept a session configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`systemPrompt` must not be empty")]
    EmptySystemPrompt,
    #[error("tool declaration #{0} has an empty name")]
    UnnamedTool(usize),
    #[error("tool `{0}` is declared more than once")]
    DuplicateTool(String),
}

/// A tool the model may call, as declared by the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// The configuration a client supplies once, as the first message of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub system_prompt: String,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    /// Behavioral switches forwarded by the client UI.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl SessionConfig {
    /// Checks the fields the upstream setup handshake depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system_prompt.trim().is_empty() {
            return Err(ConfigError::EmptySystemPrompt);
        }
        let mut seen = HashSet::new();
        for (index, tool) in self.tools.iter().enumerate() {
            let name = tool.name.trim();
            if name.is_empty() {
                return Err(ConfigError::UnnamedTool(index));
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateTool(name.to_string()));
            }
        }
        Ok(())
    }
}

/// A model-initiated request to run a named tool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Correlation token echoed back in the response.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "args")]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Returns a string argument, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub rendered: bool,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

/// The acknowledgment returned upstream for every tool call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: ToolResult,
}

impl ToolResponse {
    /// A successful acknowledgment for `call`.
    pub fn success(call: &ToolCall, state: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: ToolResult {
                rendered: true,
                state: state.into(),
                error: None,
            },
        }
    }

    /// A failed acknowledgment for `call`, carrying `message` back to the model.
    pub fn failure(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: ToolResult {
                rendered: false,
                state: "error".to_string(),
                error: Some(ToolFailure {
                    message: message.into(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(tools: Vec<&str>) -> SessionConfig {
        SessionConfig {
            system_prompt: "You help field technicians.".into(),
            tools: tools
                .into_iter()
                .map(|name| ToolDeclaration {
                    name: name.into(),
                    description: String::new(),
                    parameters: None,
                })
                .collect(),
            flags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_config_deserializes_from_client_shape() {
        let config: SessionConfig = serde_json::from_value(json!({
            "systemPrompt": "x",
            "tools": [{"name": "write_text", "description": "Show text", "parameters": {"type": "object"}}],
            "flags": {"showTranscript": true}
        }))
        .unwrap();

        assert_eq!(config.system_prompt, "x");
        assert_eq!(config.tools[0].name, "write_text");
        assert_eq!(config.flags.get("showTranscript"), Some(&true));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_requires_system_prompt() {
        let missing = serde_json::from_value::<SessionConfig>(json!({"tools": []}));
        assert!(missing.is_err());

        let mut blank = config(vec![]);
        blank.system_prompt = "   ".into();
        assert_eq!(blank.validate(), Err(ConfigError::EmptySystemPrompt));
    }

    #[test]
    fn test_config_rejects_bad_tool_names() {
        assert_eq!(config(vec!["a", ""]).validate(), Err(ConfigError::UnnamedTool(1)));
        assert_eq!(
            config(vec!["end_call", "end_call"]).validate(),
            Err(ConfigError::DuplicateTool("end_call".into()))
        );
    }

    #[test]
    fn test_tool_call_reads_wire_args() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "1", "name": "write_text", "args": {"text": "ABC"}
        }))
        .unwrap();
        assert_eq!(call.str_arg("text"), Some("ABC"));
        assert_eq!(call.str_arg("missing"), None);
    }

    #[test]
    fn test_tool_response_shapes() {
        let call = ToolCall {
            id: "7".into(),
            name: "nope".into(),
            arguments: Map::new(),
        };

        let failed = serde_json::to_value(ToolResponse::failure(&call, "Tool not implemented: nope")).unwrap();
        assert_eq!(
            failed,
            json!({"id": "7", "name": "nope", "response": {
                "rendered": false, "state": "error", "error": {"message": "Tool not implemented: nope"}
            }})
        );

        let ok = serde_json::to_value(ToolResponse::success(&call, "displayed")).unwrap();
        assert_eq!(ok["response"], json!({"rendered": true, "state": "displayed"}));
    }
}
