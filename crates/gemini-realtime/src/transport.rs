//! JSON-framed WebSocket transport to the upstream service.
//!
//! A reader task owns the receiving half and turns every WebSocket message
//! into a [`Received`] value on a channel; the sending half sits behind a lock
//! so concurrent senders never interleave writes.

use crate::error::{Result, SessionError};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on how long [`WsTransport::close`] waits for the peer's close acknowledgment.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const INBOUND_CAPACITY: usize = 64;

/// One step of the receive side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(String),
    /// The peer closed the connection, or the transport was closed locally.
    Closed,
    Error(String),
}

pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    inbound: Mutex<mpsc::Receiver<Received>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    open: Arc<AtomicBool>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let (sink, stream) = ws_stream.split();

        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_frames(stream, tx, open.clone()));

        Ok(Self {
            sink: Mutex::new(sink),
            inbound: Mutex::new(rx),
            reader: Mutex::new(Some(reader)),
            open,
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Serializes `frame` and sends it as one text message.
    pub async fn send_json<T: Serialize>(&self, frame: &T) -> Result<()> {
        if !self.is_open() {
            return Err(SessionError::NotConnected);
        }
        let payload = serde_json::to_string(frame)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(payload.into()))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    /// Waits for the next inbound message.
    pub async fn recv(&self) -> Received {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(Received::Closed)
    }

    /// Sends a close frame and waits (bounded by [`CLOSE_TIMEOUT`]) for the
    /// reader to observe the acknowledgment. Once the reader is gone, further
    /// calls only clear local state.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        // Also flushes the reply to a peer-initiated close.
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Close frame could not be sent");
        }

        let Some(mut reader) = self.reader.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut reader).await.is_err() {
            warn!("Upstream did not acknowledge close in time; abandoning reader");
            reader.abort();
        }
    }
}

async fn read_frames(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<Received>,
    open: Arc<AtomicBool>,
) {
    let last = loop {
        let received = match stream.next().await {
            Some(Ok(Message::Text(text))) => Received::Frame(text.as_str().to_owned()),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Received::Frame(text),
                Err(_) => {
                    warn!(len = data.len(), "Dropping non UTF-8 binary frame from upstream");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Upstream closed the connection");
                break Received::Closed;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!(error = %e, "Error reading from upstream WebSocket");
                break Received::Error(e.to_string());
            }
            None => break Received::Closed,
        };
        if tx.send(received).await.is_err() {
            debug!("Inbound receiver dropped; stopping reader");
            open.store(false, Ordering::SeqCst);
            return;
        }
    };
    open.store(false, Ordering::SeqCst);
    // Waits for room so a failure is never reported as a clean close; `close` bounds this wait.
    if tx.send(last).await.is_err() {
        debug!("Inbound receiver dropped before the final event");
    }
}
