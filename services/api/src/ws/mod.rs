//! WebSocket relay between the browser client and the upstream AI service.
//!
//! - `protocol`: the JSON messages exchanged with the client.
//! - `client`: the client-facing sink events are written to.
//! - `session`: connection lifecycle, from configuration to teardown.
//! - `relay`: the upstream receive loop and the client message handler.
//! - `tools`: dispatch of model-initiated tool calls.

pub mod client;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use session::ws_handler;
