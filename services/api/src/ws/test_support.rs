//! In-process fakes for both ends of a relay session.
//!
//! Both fakes append to one shared log, so tests can assert the order of
//! events across the client and upstream transports.

use super::{client::ClientSink, protocol::ServerMessage};
use async_trait::async_trait;
use fieldcall_core::ToolResponse;
use gemini_realtime::{SessionError, Upstream};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Client(ServerMessage),
    ClientClosed(u16),
    Text(String),
    Image(String),
    Continue(Option<Value>),
    End(Option<Value>),
    ToolResponse(ToolResponse),
    UpstreamClosed,
}

pub type Log = Arc<Mutex<Vec<Event>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub struct FakeClient {
    log: Log,
    open: AtomicBool,
}

impl FakeClient {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl ClientSink for FakeClient {
    async fn send(&self, msg: ServerMessage) -> anyhow::Result<()> {
        if !self.is_open() {
            anyhow::bail!("client socket is closed");
        }
        self.log.lock().unwrap().push(Event::Client(msg));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self, code: u16, _reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        self.log.lock().unwrap().push(Event::ClientClosed(code));
    }
}

/// What [`FakeUpstream::receive`] hands out next.
pub enum Inbound {
    Frame(String),
    Error(String),
}

pub struct FakeUpstream {
    log: Log,
    open: AtomicBool,
    inbound: Mutex<VecDeque<Inbound>>,
}

impl FakeUpstream {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            open: AtomicBool::new(true),
            inbound: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a frame for the receive loop.
    pub fn push_frame(&self, raw: impl Into<String>) {
        self.inbound
            .lock()
            .unwrap()
            .push_back(Inbound::Frame(raw.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.inbound
            .lock()
            .unwrap()
            .push_back(Inbound::Error(message.into()));
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    fn record(&self, event: Event) -> gemini_realtime::Result<()> {
        if !self.is_open() {
            return Err(SessionError::NotConnected);
        }
        self.log.lock().unwrap().push(event);
        Ok(())
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> gemini_realtime::Result<()> {
        self.record(Event::Text(text.to_string()))
    }

    async fn send_image(&self, base64_payload: &str) -> gemini_realtime::Result<()> {
        self.record(Event::Image(base64_payload.to_string()))
    }

    async fn send_continue(&self, envelope: Option<Value>) -> gemini_realtime::Result<()> {
        self.record(Event::Continue(envelope))
    }

    async fn send_end(&self, envelope: Option<Value>) -> gemini_realtime::Result<()> {
        self.record(Event::End(envelope))
    }

    async fn send_tool_response(&self, response: ToolResponse) -> gemini_realtime::Result<()> {
        self.record(Event::ToolResponse(response))
    }

    /// Drains queued frames, then reports the transport as closed.
    async fn receive(&self) -> gemini_realtime::Result<Option<String>> {
        let next = self.inbound.lock().unwrap().pop_front();
        match next {
            Some(Inbound::Frame(raw)) => Ok(Some(raw)),
            Some(Inbound::Error(e)) => {
                self.set_open(false);
                Err(SessionError::Transport(e))
            }
            None => {
                self.set_open(false);
                Ok(None)
            }
        }
    }

    async fn close(&self) -> gemini_realtime::Result<()> {
        self.set_open(false);
        self.log.lock().unwrap().push(Event::UpstreamClosed);
        Ok(())
    }
}
