//! Whole-loop exercise: transcript in, spoken reply out, session back at
//! rest. Uses the scripted capture/sink so the flow is deterministic.

use solace::capture::scripted::{ChannelCapture, ScriptedDevice};
use solace::dialogue::{DialogueContext, DialogueEngine};
use solace::playback::{EnqueueMode, PlaybackEvent, PlaybackQueue, QueueEntry, ScriptedSink};
use solace::session::{SessionConfig, SessionEvent, VoiceSession, VoiceState};
use solace::synthesis::{CannedSynthesizer, SpeechSynthesizer};
use tokio::sync::mpsc;

#[tokio::test]
async fn one_turn_round_trip() {
    let (cap_tx, cap_rx) = mpsc::unbounded_channel();
    let (capture, feed) = ChannelCapture::new(cap_tx);
    let mut session = VoiceSession::new(
        SessionConfig::default(),
        Box::new(ScriptedDevice::granted()),
        Box::new(capture),
        cap_rx,
    );
    let mut session_rx = session.subscribe();

    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let mut queue = PlaybackQueue::new(ScriptedSink::auto_completing(sink_tx), sink_rx);
    let mut queue_rx = queue.subscribe();

    let mut engine = DialogueEngine::new(11);
    let mut ctx = DialogueContext::new();
    let synthesizer = CannedSynthesizer::silent();

    // Capture an utterance.
    session.initialize().await.unwrap();
    session.activate().await.unwrap();
    feed.push_transcript("I've been feeling anxious about work", true);
    session.pump();
    assert_eq!(session.state(), VoiceState::Processing);

    let transcript = {
        let mut found = None;
        while let Ok(ev) = session_rx.try_recv() {
            if let SessionEvent::Transcript { text, is_final: true } = ev {
                found = Some(text);
            }
        }
        found.expect("final transcript")
    };

    // Select content and speak it.
    let reply = engine.respond(&mut ctx, &transcript, &[]);
    assert!(!reply.text.is_empty());
    assert!(reply.crisis.is_none());
    session.begin_thinking();
    assert_eq!(session.state(), VoiceState::Thinking);

    let clip = synthesizer.synthesize(&reply.text).await.unwrap();
    queue.enqueue(QueueEntry::new(clip, 10, EnqueueMode::Queue));

    // The auto-completing sink finishes the clip as soon as it starts.
    queue.pump();
    let mut spoke = false;
    while let Ok(ev) = queue_rx.try_recv() {
        match ev {
            PlaybackEvent::Started(_) => {
                session.on_playback_started();
                spoke = true;
            }
            PlaybackEvent::Finished(_) => {
                if !queue.state().is_playing {
                    session.on_playback_finished();
                }
            }
            _ => {}
        }
    }

    assert!(spoke);
    assert_eq!(session.state(), VoiceState::Idle);

    let events: Vec<SessionEvent> = {
        let mut out = Vec::new();
        while let Ok(ev) = session_rx.try_recv() {
            out.push(ev);
        }
        out
    };
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::SpeakingStarted)));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::SpeakingEnded)));
}
