//! Shared Application State

use crate::{config::Config, registry::SessionRegistry, ws::tools::ToolDispatcher};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    pub tools: Arc<ToolDispatcher>,
}

impl AppState {
    /// State with an empty registry and the built-in tools.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            tools: Arc::new(ToolDispatcher::with_defaults()),
        }
    }
}
