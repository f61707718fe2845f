use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use solace::playback::{
    ClipSource, EnqueueMode, PlaybackError, PlaybackEvent, PlaybackQueue, QueueEntry,
    ReleaseGuard, ScriptedSink, SinkEvent, SinkProbe,
};
use tokio::sync::mpsc;

fn clip() -> ClipSource {
    ClipSource::Buffer(Arc::new(vec![0u8; 16]))
}

fn counted_entry(
    priority: i32,
    mode: EnqueueMode,
    releases: &Arc<AtomicUsize>,
) -> QueueEntry {
    let counter = Arc::clone(releases);
    QueueEntry::new(clip(), priority, mode)
        .with_guard(ReleaseGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
}

struct Harness {
    queue: PlaybackQueue<ScriptedSink>,
    sink_tx: mpsc::UnboundedSender<SinkEvent>,
    events: mpsc::UnboundedReceiver<PlaybackEvent>,
    probe: Arc<SinkProbe>,
}

fn harness() -> Harness {
    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let sink = ScriptedSink::new(sink_tx.clone());
    let probe = sink.probe();
    let mut queue = PlaybackQueue::new(sink, sink_rx);
    let events = queue.subscribe();
    Harness {
        queue,
        sink_tx,
        events,
        probe,
    }
}

impl Harness {
    fn finish_current(&mut self) {
        self.sink_tx.send(SinkEvent::Ended).unwrap();
        self.queue.pump();
    }

    fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

#[test]
fn idle_enqueue_plays_immediately() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    let id = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));

    let state = h.queue.state();
    assert!(state.is_playing);
    assert_eq!(state.current_id, Some(id));
    assert_eq!(state.queue_len, 0);
    assert!(matches!(
        h.drain_events().as_slice(),
        [PlaybackEvent::Started(started)] if *started == id
    ));
}

#[test]
fn higher_priority_jumps_ahead_of_waiting_entries() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    let _playing = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let low_a = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let low_b = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let high = h.queue.enqueue(counted_entry(5, EnqueueMode::Queue, &releases));
    assert_eq!(h.queue.state().queue_len, 3);

    h.finish_current();
    assert_eq!(h.queue.state().current_id, Some(high));

    // Equal priorities keep insertion order (stable ties).
    h.finish_current();
    assert_eq!(h.queue.state().current_id, Some(low_a));
    h.finish_current();
    assert_eq!(h.queue.state().current_id, Some(low_b));
}

#[test]
fn at_most_one_entry_playing_across_arbitrary_enqueues() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    let modes = [
        EnqueueMode::Queue,
        EnqueueMode::Interrupt,
        EnqueueMode::Queue,
        EnqueueMode::Replace,
        EnqueueMode::Queue,
        EnqueueMode::Interrupt,
    ];
    for (i, mode) in modes.into_iter().enumerate() {
        h.queue.enqueue(counted_entry(i as i32, mode, &releases));
        // The scripted sink plays exactly one clip per begin; the probe
        // play count minus completions can never exceed one.
        assert!(h.queue.state().current_id.is_some());
    }
    assert_eq!(
        h.probe.plays(),
        h.probe.stops.load(Ordering::SeqCst) + 1,
        "every playing clip but the live one was explicitly stopped"
    );
}

#[test]
fn every_entry_released_exactly_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();
    let mut total = 0;

    // Natural end.
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    total += 1;
    h.finish_current();

    // Playback error.
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    total += 1;
    h.sink_tx.send(SinkEvent::Errored("decode".into())).unwrap();
    h.queue.pump();

    // Interrupt stops the current clip.
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    h.queue.enqueue(counted_entry(1, EnqueueMode::Interrupt, &releases));
    total += 2;

    // Replace discards the waiting list.
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    h.queue.enqueue(counted_entry(9, EnqueueMode::Replace, &releases));
    total += 3;

    // Explicit stop clears everything still held.
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    total += 1;
    h.queue.stop();

    assert_eq!(releases.load(Ordering::SeqCst), total);
}

#[test]
fn dropping_the_queue_releases_held_entries() {
    let releases = Arc::new(AtomicUsize::new(0));
    {
        let mut h = harness();
        h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
        h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }
    assert_eq!(releases.load(Ordering::SeqCst), 2);
}

#[test]
fn playback_error_advances_to_next_entry() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    let failing = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let next = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));

    h.sink_tx.send(SinkEvent::Errored("stream died".into())).unwrap();
    h.queue.pump();

    assert_eq!(h.queue.state().current_id, Some(next));
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlaybackEvent::Failed(id, msg) if *id == failing && msg.contains("stream died")
    )));
}

#[test]
fn failed_start_counts_as_completion() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    *h.probe.fail_next.lock().unwrap() = Some(PlaybackError::NoOutputDevice);
    let failed = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));

    assert!(!h.queue.state().is_playing);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, PlaybackEvent::Failed(id, _) if *id == failed)));
}

#[test]
fn skip_starts_next_without_reordering() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let second = h.queue.enqueue(counted_entry(3, EnqueueMode::Queue, &releases));
    let third = h.queue.enqueue(counted_entry(2, EnqueueMode::Queue, &releases));

    h.queue.skip();
    assert_eq!(h.queue.state().current_id, Some(second));
    h.queue.skip();
    assert_eq!(h.queue.state().current_id, Some(third));
    h.queue.skip();
    assert!(h.queue.state().current_id.is_none());
    assert_eq!(releases.load(Ordering::SeqCst), 3);
}

#[test]
fn pause_and_resume_are_noops_when_idle() {
    let mut h = harness();
    h.queue.pause();
    h.queue.resume();
    assert_eq!(h.probe.pauses.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.resumes.load(Ordering::SeqCst), 0);

    let releases = Arc::new(AtomicUsize::new(0));
    h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    h.queue.pause();
    assert!(!h.queue.state().is_playing);
    h.queue.resume();
    assert!(h.queue.state().is_playing);
    assert_eq!(h.probe.pauses.load(Ordering::SeqCst), 1);
    assert_eq!(h.probe.resumes.load(Ordering::SeqCst), 1);
}

#[test]
fn completion_self_drives_the_queue() {
    let releases = Arc::new(AtomicUsize::new(0));
    let mut h = harness();

    let first = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));
    let second = h.queue.enqueue(counted_entry(1, EnqueueMode::Queue, &releases));

    h.finish_current();
    let events = h.drain_events();
    let finished_then_started = events.windows(2).any(|w| {
        matches!(
            (&w[0], &w[1]),
            (PlaybackEvent::Finished(a), PlaybackEvent::Started(b)) if *a == first && *b == second
        )
    });
    assert!(finished_then_started, "next entry must start unprompted");
}
