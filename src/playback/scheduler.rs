//! Playback cursor management and segment tracking
//!
//! The scheduler keeps a single "next start time" cursor on the output
//! clock's timeline. Every enqueued segment starts at
//! `max(cursor, clock_now)` and advances the cursor by exactly its duration,
//! so consecutive segments are seamless under normal delivery. All scheduled
//! segments stay in an active set until they finish or are force-stopped,
//! which is the barge-in path: halt everything, clear the set, reset the
//! cursor to zero so the next segment plays immediately.

use std::collections::HashSet;

use crate::codec::AudioFrame;

/// Identifier for a scheduled playback segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(pub u64);

/// Output device seam for the scheduler
///
/// `clock_now` and `schedule` share one timeline measured in seconds.
/// Implementations report naturally finished segments through
/// `drain_finished`; the scheduler reaps them before every scheduling
/// decision.
pub trait OutputSink {
    /// Current time on the output clock, in seconds
    fn clock_now(&self) -> f64;

    /// Schedule a frame to begin playing at `start_at` on the output clock
    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> SegmentId;

    /// Forcibly stop a segment. Halting a segment that already finished
    /// (or was never scheduled) is a no-op, not an error.
    fn halt(&mut self, id: SegmentId);

    /// Segments that finished playing naturally since the last call
    fn drain_finished(&mut self) -> Vec<SegmentId>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn clock_now(&self) -> f64 {
        (**self).clock_now()
    }

    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> SegmentId {
        (**self).schedule(frame, start_at)
    }

    fn halt(&mut self, id: SegmentId) {
        (**self).halt(id)
    }

    fn drain_finished(&mut self) -> Vec<SegmentId> {
        (**self).drain_finished()
    }
}

/// Schedules decoded model audio gaplessly onto an output sink
#[derive(Debug)]
pub struct PlaybackScheduler<S: OutputSink> {
    sink: S,
    /// Next start time on the output clock, monotonically non-decreasing
    /// between stops
    cursor: f64,
    /// Scheduled-but-not-finished segments
    active: HashSet<SegmentId>,
}

impl<S: OutputSink> PlaybackScheduler<S> {
    /// Create a scheduler over the given sink with the cursor at zero
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            cursor: 0.0,
            active: HashSet::new(),
        }
    }

    /// Queue a frame for gapless playback
    ///
    /// Returns the start time chosen for the frame, mostly useful for
    /// logging and tests.
    pub fn enqueue(&mut self, frame: AudioFrame) -> f64 {
        self.reap();

        let start_at = self.cursor.max(self.sink.clock_now());
        let duration = frame.duration_secs();
        let id = self.sink.schedule(frame, start_at);
        self.active.insert(id);
        self.cursor = start_at + duration;

        log::debug!(
            "Playback: scheduled segment {:?} at {:.3}s ({:.3}s long), cursor now {:.3}s",
            id,
            start_at,
            duration,
            self.cursor
        );

        start_at
    }

    /// Force-stop everything currently scheduled and reset the cursor
    ///
    /// Safe to call at any time, including with nothing playing. After this
    /// the next enqueue starts immediately instead of at a stale future
    /// timestamp.
    pub fn stop_all(&mut self) {
        for id in self.active.drain() {
            self.sink.halt(id);
        }
        self.cursor = 0.0;
        log::debug!("Playback: stopped all segments, cursor reset");
    }

    /// Number of segments scheduled and not yet finished
    pub fn active_len(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    /// Current cursor position in seconds
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Access the underlying sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn reap(&mut self) {
        for id in self.sink.drain_finished() {
            self.active.remove(&id);
        }
    }
}
