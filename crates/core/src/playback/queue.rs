use super::{AudioOutput, AudioSegment, PlaybackError, PlaybackEvent};
use crate::audio::{PLAYBACK_SAMPLE_RATE, convert_i16_to_f32};
use std::collections::VecDeque;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a segment may claim to be playing while others wait before it is
/// treated as stalled.
pub const STALL_THRESHOLD: Duration = Duration::from_secs(1);

/// Outcome of a device-reported segment completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The id was not the active segment (discarded, skipped or unknown).
    Stale,
    /// More segments are queued; call [`PlaybackQueue::start_pending`] on the next tick.
    NextPending,
    /// The queue is empty and playback finished.
    Drained,
}

/// Result of one stall-detection tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallCheck {
    /// Not playing (or disposed); the watchdog should stop.
    Stopped,
    Healthy,
    /// Playback was forced onto the next segment.
    Recovered,
}

/// FIFO playback state machine over an [`AudioOutput`].
///
/// Every mutation is synchronous and takes the current instant explicitly, so
/// the driver decides how time flows. Events accumulate until
/// [`drain_events`](Self::drain_events) is called.
pub struct PlaybackQueue<O> {
    output: O,
    segments: VecDeque<AudioSegment>,
    active: Option<u64>,
    playing: bool,
    last_started: Option<Instant>,
    next_id: u64,
    disposed: bool,
    events: Vec<PlaybackEvent>,
}

impl<O: AudioOutput> PlaybackQueue<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            segments: VecDeque::new(),
            active: None,
            playing: false,
            last_started: None,
            next_id: 0,
            disposed: false,
            events: Vec::new(),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Number of segments waiting behind the active one.
    pub fn queued(&self) -> usize {
        self.segments.len()
    }

    pub fn active_segment(&self) -> Option<u64> {
        self.active
    }

    pub fn last_started(&self) -> Option<Instant> {
        self.last_started
    }

    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Appends a PCM16 chunk and starts it right away when idle.
    /// Returns the segment id, or `None` once disposed.
    pub fn enqueue(&mut self, pcm: &[i16], now: Instant) -> Option<u64> {
        if self.disposed {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.segments.push_back(AudioSegment {
            id,
            samples: convert_i16_to_f32(pcm),
            sample_rate: PLAYBACK_SAMPLE_RATE,
        });
        if !self.playing {
            self.advance(now);
        }
        Some(id)
    }

    pub fn segment_finished(&mut self, id: u64) -> SegmentEnd {
        if self.disposed || self.active != Some(id) {
            debug!(segment = id, "Ignoring completion of inactive segment");
            return SegmentEnd::Stale;
        }
        self.active = None;
        if self.segments.is_empty() {
            self.playing = false;
            self.events.push(PlaybackEvent::Completed);
            SegmentEnd::Drained
        } else {
            SegmentEnd::NextPending
        }
    }

    /// Starts the head segment after a [`SegmentEnd::NextPending`] completion.
    /// No-op if something else already started, stopped or disposed playback.
    pub fn start_pending(&mut self, now: Instant) {
        if self.disposed || !self.playing || self.active.is_some() {
            return;
        }
        self.advance(now);
    }

    pub fn check_stall(&mut self, now: Instant) -> StallCheck {
        if self.disposed || !self.playing {
            return StallCheck::Stopped;
        }
        let stalled = self
            .last_started
            .is_some_and(|started| now.saturating_duration_since(started) > STALL_THRESHOLD);
        if !stalled || self.segments.is_empty() {
            return StallCheck::Healthy;
        }

        let skipped = self.active.take();
        warn!(
            ?skipped,
            queued = self.segments.len(),
            "Playback stalled; forcing advance to the next segment"
        );
        if skipped.is_some() {
            self.output.halt();
        }
        self.events.push(PlaybackEvent::StallRecovered { skipped });
        self.advance(now);
        StallCheck::Recovered
    }

    /// Flushes the queue and silences output after a barge-in.
    pub fn stop(&mut self) {
        if self.disposed {
            return;
        }
        self.segments.clear();
        if self.active.take().is_some() {
            self.output.halt();
        }
        self.playing = false;
        self.output.set_gain(0.0);
        self.events.push(PlaybackEvent::Interrupted);
    }

    /// Makes output audible again after [`stop`](Self::stop).
    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.disposed {
            return Ok(());
        }
        self.output.resume()?;
        self.output.set_gain(1.0);
        Ok(())
    }

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.segments.clear();
        if self.active.take().is_some() {
            self.output.halt();
        }
        self.playing = false;
        self.output.set_gain(0.0);
        self.events.clear();
        self.disposed = true;
    }

    fn advance(&mut self, now: Instant) {
        while let Some(segment) = self.segments.pop_front() {
            match self.output.start(&segment) {
                Ok(()) => {
                    self.active = Some(segment.id);
                    self.playing = true;
                    self.last_started = Some(now);
                    self.events
                        .push(PlaybackEvent::SegmentStarted { id: segment.id });
                    return;
                }
                Err(e) => {
                    warn!(segment = segment.id, error = %e, "Output refused segment; dropping it");
                }
            }
        }
        let was_playing = self.playing;
        self.active = None;
        self.playing = false;
        if was_playing {
            self.events.push(PlaybackEvent::Completed);
        }
    }
}
