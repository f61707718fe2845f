use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sink::{AudioSink, SinkEvent};

/// What a clip is made of: bytes already in hand, or a reference the sink
/// resolves (a file path or URL).
#[derive(Debug, Clone)]
pub enum ClipSource {
    Buffer(Arc<Vec<u8>>),
    Reference(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueMode {
    /// Stop the current clip, play this one now, keep the waiting list.
    Interrupt,
    /// Play now if idle, otherwise wait in priority order.
    Queue,
    /// Stop the current clip and discard every waiting entry.
    Replace,
}

/// One-shot release of an entry's transient resource. Fires on whichever
/// terminal path comes first; dropping an unfired guard fires it, so queue
/// destruction cannot leak.
pub struct ReleaseGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ReleaseGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn noop() -> Self {
        Self { release: None }
    }

    fn fire(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

pub struct QueueEntry {
    pub id: Uuid,
    pub source: ClipSource,
    pub priority: i32,
    pub mode: EnqueueMode,
    pub volume: f32,
    pub rate: f32,
    pub guard: ReleaseGuard,
}

impl QueueEntry {
    pub fn new(source: ClipSource, priority: i32, mode: EnqueueMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            priority,
            mode,
            volume: 1.0,
            rate: 1.0,
            guard: ReleaseGuard::noop(),
        }
    }

    pub fn with_guard(mut self, guard: ReleaseGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }
}

/// Observable playback lifecycle. One subscriber, each event once.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Started(Uuid),
    Finished(Uuid),
    Failed(Uuid, String),
    Stopped(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueState {
    pub is_playing: bool,
    pub current_id: Option<Uuid>,
    pub queue_len: usize,
}

/// Sequences synthesized speech: at most one clip audible at a time,
/// waiting clips in descending priority (stable on ties), completion
/// self-drives the next entry.
pub struct PlaybackQueue<S: AudioSink> {
    sink: S,
    sink_rx: mpsc::UnboundedReceiver<SinkEvent>,
    current: Option<QueueEntry>,
    waiting: VecDeque<QueueEntry>,
    paused: bool,
    events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl<S: AudioSink> PlaybackQueue<S> {
    pub fn new(sink: S, sink_rx: mpsc::UnboundedReceiver<SinkEvent>) -> Self {
        Self {
            sink,
            sink_rx,
            current: None,
            waiting: VecDeque::new(),
            paused: false,
            events: None,
        }
    }

    /// Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            is_playing: self.current.is_some() && !self.paused,
            current_id: self.current.as_ref().map(|e| e.id),
            queue_len: self.waiting.len(),
        }
    }

    pub fn enqueue(&mut self, entry: QueueEntry) -> Uuid {
        let id = entry.id;
        match entry.mode {
            EnqueueMode::Interrupt => {
                self.stop_current();
                self.begin(entry);
            }
            EnqueueMode::Replace => {
                self.stop_current();
                self.clear_waiting();
                self.begin(entry);
            }
            EnqueueMode::Queue => {
                if self.current.is_none() {
                    self.begin(entry);
                } else {
                    self.insert_by_priority(entry);
                }
            }
        }
        id
    }

    /// Descending priority, ties behind existing entries of equal priority.
    fn insert_by_priority(&mut self, entry: QueueEntry) {
        let pos = self
            .waiting
            .iter()
            .position(|e| e.priority < entry.priority)
            .unwrap_or(self.waiting.len());
        debug!(
            "queued clip {} at position {} (priority {})",
            entry.id, pos, entry.priority
        );
        self.waiting.insert(pos, entry);
    }

    fn begin(&mut self, mut entry: QueueEntry) {
        match self.sink.play(&entry.source, entry.volume, entry.rate) {
            Ok(()) => {
                info!("playing clip {}", entry.id);
                self.paused = false;
                self.emit(PlaybackEvent::Started(entry.id));
                self.current = Some(entry);
            }
            Err(e) => {
                // A failed start counts as completion: release, report, and
                // keep the queue moving.
                warn!("clip {} failed to start: {}", entry.id, e);
                entry.guard.fire();
                self.emit(PlaybackEvent::Failed(entry.id, e.to_string()));
                self.advance();
            }
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.waiting.pop_front() {
            self.begin(next);
        }
    }

    fn stop_current(&mut self) {
        if let Some(mut entry) = self.current.take() {
            self.sink.stop();
            // Anything the sink reported before the stop belonged to this
            // clip; drop it so the next clip cannot inherit a completion.
            while self.sink_rx.try_recv().is_ok() {}
            entry.guard.fire();
            self.emit(PlaybackEvent::Stopped(entry.id));
        }
        self.paused = false;
    }

    fn clear_waiting(&mut self) {
        let drained: Vec<_> = self.waiting.drain(..).collect();
        for mut entry in drained {
            entry.guard.fire();
            self.emit(PlaybackEvent::Stopped(entry.id));
        }
    }

    pub fn pause(&mut self) {
        if self.current.is_some() && !self.paused {
            self.sink.pause();
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.current.is_some() && self.paused {
            self.sink.resume();
            self.paused = false;
        }
    }

    /// Stop everything and release every held resource.
    pub fn stop(&mut self) {
        self.stop_current();
        self.clear_waiting();
    }

    /// Stop the current clip and start the next waiting one, if any.
    pub fn skip(&mut self) {
        self.stop_current();
        self.advance();
    }

    /// Apply sink completions. The host calls this from its cadence loop;
    /// tests feed events directly through the sink channel first.
    pub fn pump(&mut self) {
        while let Ok(event) = self.sink_rx.try_recv() {
            self.on_sink_event(event);
        }
    }

    pub fn on_sink_event(&mut self, event: SinkEvent) {
        // A completion with no current clip is stale (the clip was already
        // stopped and accounted for); acting on it would double-advance.
        match event {
            SinkEvent::Ended => {
                if let Some(mut entry) = self.current.take() {
                    entry.guard.fire();
                    self.emit(PlaybackEvent::Finished(entry.id));
                    self.paused = false;
                    self.advance();
                }
            }
            SinkEvent::Errored(message) => {
                // Errors never halt the queue: report and move on.
                if let Some(mut entry) = self.current.take() {
                    entry.guard.fire();
                    warn!("clip {} playback error: {}", entry.id, message);
                    self.emit(PlaybackEvent::Failed(entry.id, message));
                    self.paused = false;
                    self.advance();
                }
            }
        }
    }
}

impl<S: AudioSink> Drop for PlaybackQueue<S> {
    fn drop(&mut self) {
        // Guards fire on drop, so destruction releases whatever is left.
        self.sink.stop();
    }
}
