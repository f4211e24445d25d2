//! Fieldcall API Library Crate
//!
//! The relay service: application state, the session registry, the WebSocket
//! relay and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
