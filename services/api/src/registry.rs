//! Process-wide registry of live relay sessions, keyed by client id.

use crate::ws::client::ClientSink;
use fieldcall_core::{TurnMachine, TurnState};
use gemini_realtime::Upstream;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("client `{0}` already has a live session")]
    DuplicateClient(String),
}

/// One client connection and the upstream session it owns.
pub struct Session {
    id: String,
    client: Arc<dyn ClientSink>,
    upstream: Mutex<Option<Arc<dyn Upstream>>>,
    configured: AtomicBool,
    turn: Mutex<TurnMachine>,
}

impl Session {
    pub fn new(id: impl Into<String>, client: Arc<dyn ClientSink>) -> Self {
        Self {
            id: id.into(),
            client,
            upstream: Mutex::new(None),
            configured: AtomicBool::new(false),
            turn: Mutex::new(TurnMachine::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &Arc<dyn ClientSink> {
        &self.client
    }

    pub fn upstream(&self) -> Option<Arc<dyn Upstream>> {
        self.upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores the connected upstream and marks the configuration as accepted.
    pub fn attach_upstream(&self, upstream: Arc<dyn Upstream>) {
        *self.upstream.lock().unwrap_or_else(PoisonError::into_inner) = Some(upstream);
        self.configured.store(true, Ordering::SeqCst);
    }

    fn detach_upstream(&self) -> Option<Arc<dyn Upstream>> {
        self.upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner).state()
    }

    /// Moves the turn state machine; an illegal edge is logged and leaves the state unchanged.
    pub fn transition(&self, to: TurnState) -> bool {
        let mut turn = self.turn.lock().unwrap_or_else(PoisonError::into_inner);
        match turn.transition(to) {
            Ok(from) => {
                debug!(client_id = %self.id, %from, %to, "Turn state changed");
                true
            }
            Err(e) => {
                warn!(client_id = %self.id, error = %e, "Rejected turn transition");
                false
            }
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session for `client_id`. A live id is never replaced.
    pub async fn register(
        &self,
        client_id: &str,
        client: Arc<dyn ClientSink>,
    ) -> Result<Arc<Session>, RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(client_id) {
            return Err(RegistryError::DuplicateClient(client_id.to_string()));
        }
        let session = Arc::new(Session::new(client_id, client));
        sessions.insert(client_id.to_string(), session.clone());
        info!(client_id, live = sessions.len(), "Session registered");
        Ok(session)
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(client_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Removes the session and closes its upstream. Returns false if it was already gone.
    pub async fn cleanup(&self, client_id: &str) -> bool {
        let Some(session) = self.sessions.write().await.remove(client_id) else {
            debug!(client_id, "Cleanup for an unknown or already removed session");
            return false;
        };
        if let Some(upstream) = session.detach_upstream() {
            if let Err(e) = upstream.close().await {
                warn!(client_id, error = %e, "Upstream close failed during cleanup");
            }
        }
        info!(client_id, "Session cleaned up");
        true
    }
}
