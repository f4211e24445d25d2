//! Client-side playback of assistant audio.
//!
//! [`PlaybackQueue`] holds the FIFO of decoded segments and the turn-related
//! rules (flush on interruption, stall recovery). [`PlaybackBuffer`] drives it
//! from a Tokio runtime: it runs the stall watchdog, defers segment hand-off to
//! the next tick and publishes [`PlaybackEvent`]s on a channel.

mod queue;

pub use queue::{PlaybackQueue, STALL_THRESHOLD, SegmentEnd, StallCheck};

use crate::audio::decode_i16;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle, time::Instant};
use tracing::debug;

/// Period of the stall watchdog.
pub const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio output error: {0}")]
    Output(String),
    #[error("playback must be created inside a Tokio runtime")]
    NoRuntime,
}

/// A decoded mono buffer, immutable once queued.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub id: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// The output unit segments are played through.
///
/// Implementations report the natural end of a segment by calling
/// [`PlaybackBuffer::segment_finished`] with the segment id.
pub trait AudioOutput: Send + 'static {
    fn start(&mut self, segment: &AudioSegment) -> Result<(), PlaybackError>;
    /// Halts and disconnects the active segment.
    fn halt(&mut self);
    fn set_gain(&mut self, gain: f32);
    /// Revives a suspended output context.
    fn resume(&mut self) -> Result<(), PlaybackError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    SegmentStarted { id: u64 },
    /// The last queued segment finished.
    Completed,
    /// The queue was flushed by [`PlaybackBuffer::stop`].
    Interrupted,
    /// The watchdog skipped a segment whose completion never arrived.
    StallRecovered { skipped: Option<u64> },
}

struct Shared<O> {
    queue: PlaybackQueue<O>,
    events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
    watchdog: Option<JoinHandle<()>>,
}

impl<O: AudioOutput> Shared<O> {
    fn publish(&mut self) {
        let events = self.queue.drain_events();
        let Some(tx) = &self.events else {
            return;
        };
        for event in events {
            if tx.send(event).is_err() {
                debug!("Playback event receiver dropped");
                break;
            }
        }
    }
}

fn lock<O>(shared: &Mutex<Shared<O>>) -> MutexGuard<'_, Shared<O>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime driver around a [`PlaybackQueue`].
pub struct PlaybackBuffer<O: AudioOutput> {
    shared: Arc<Mutex<Shared<O>>>,
    runtime: Handle,
}

impl<O: AudioOutput> PlaybackBuffer<O> {
    /// Creates the buffer and the receiver its events are published on.
    pub fn new(output: O) -> Result<(Self, mpsc::UnboundedReceiver<PlaybackEvent>), PlaybackError> {
        let runtime = Handle::try_current().map_err(|_| PlaybackError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Shared {
            queue: PlaybackQueue::new(output),
            events: Some(tx),
            watchdog: None,
        };
        Ok((
            Self {
                shared: Arc::new(Mutex::new(shared)),
                runtime,
            },
            rx,
        ))
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.shared).queue.is_playing()
    }

    pub fn queued(&self) -> usize {
        lock(&self.shared).queue.queued()
    }

    /// Queues signed 16-bit samples. Returns the segment id, or `None` once disposed.
    pub fn enqueue(&self, pcm: &[i16]) -> Option<u64> {
        let mut shared = lock(&self.shared);
        let id = shared.queue.enqueue(pcm, Instant::now());
        shared.publish();
        if id.is_some() {
            self.arm_watchdog(&mut shared);
        }
        id
    }

    /// Queues a base64 PCM16 blob as delivered over the wire.
    pub fn enqueue_base64(&self, fragment: &str) -> Option<u64> {
        let pcm = decode_i16(fragment);
        if pcm.is_empty() {
            return None;
        }
        self.enqueue(&pcm)
    }

    /// Reports that the output finished segment `id`.
    ///
    /// May be called from any thread. The next segment starts on a fresh task
    /// so the output unit is never restarted from inside its own completion.
    pub fn segment_finished(&self, id: u64) {
        let mut shared = lock(&self.shared);
        let end = shared.queue.segment_finished(id);
        shared.publish();
        if end != SegmentEnd::NextPending {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        self.runtime.spawn(async move {
            tokio::task::yield_now().await;
            if let Some(shared) = weak.upgrade() {
                let mut shared = lock(&shared);
                shared.queue.start_pending(Instant::now());
                shared.publish();
            }
        });
    }

    /// Empties the queue, halts output and publishes [`PlaybackEvent::Interrupted`].
    pub fn stop(&self) {
        let mut shared = lock(&self.shared);
        shared.queue.stop();
        shared.publish();
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        lock(&self.shared).queue.resume()
    }

    /// Stops everything and drops the event sender. Every later call is a no-op.
    pub fn dispose(&self) {
        let mut shared = lock(&self.shared);
        shared.queue.dispose();
        shared.events = None;
        if let Some(watchdog) = shared.watchdog.take() {
            watchdog.abort();
        }
    }

    fn arm_watchdog(&self, shared: &mut Shared<O>) {
        if shared.watchdog.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        shared.watchdog = Some(self.runtime.spawn(watch_for_stalls(weak)));
    }
}

async fn watch_for_stalls<O: AudioOutput>(weak: Weak<Mutex<Shared<O>>>) {
    loop {
        tokio::time::sleep(STALL_CHECK_INTERVAL).await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        let mut shared = lock(&shared);
        match shared.queue.check_stall(Instant::now()) {
            // Cleared under the lock so the next enqueue re-arms.
            StallCheck::Stopped => {
                shared.watchdog = None;
                break;
            }
            StallCheck::Healthy => {}
            StallCheck::Recovered => shared.publish(),
        }
    }
}

impl<O: AudioOutput> Drop for PlaybackBuffer<O> {
    fn drop(&mut self) {
        self.dispose();
    }
}
