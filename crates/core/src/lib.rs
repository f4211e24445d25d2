pub mod audio;
pub mod generic_types;
pub mod playback;
pub mod turn;

pub use generic_types::{
    ConfigError, SessionConfig, ToolCall, ToolDeclaration, ToolFailure, ToolResponse, ToolResult,
};
pub use turn::{TurnError, TurnMachine, TurnState};
