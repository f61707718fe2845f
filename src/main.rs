use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use solace::capture::device::MicrophoneInput;
use solace::capture::recognizer::{HttpTranscriber, LocalSpeechCapture};
use solace::capture::scripted::{CaptureFeed, ChannelCapture, ScriptedDevice};
use solace::capture::{CaptureDevice, SpeechCapture};
use solace::dialogue::{DialogueContext, DialogueEngine};
use solace::playback::{
    AudioSink, EnqueueMode, PlaybackEvent, PlaybackQueue, QueueEntry, ScriptedSink, SpeakerSink,
};

use solace::ritual::{RitualSegment, SegmentPacer};
use solace::session::{SessionConfig, SessionEvent, VoiceSession, VoiceState};
use solace::store::{CompanionStore, RitualCompletion};
use solace::synthesis::{CannedSynthesizer, HttpSynthesizer, SpeechSynthesizer};

/// Priorities on the single playback channel. Crisis responses outrank
/// everything and interrupt; ritual segments sit below normal replies so a
/// direct answer is never starved by a running ritual.
const PRIORITY_CRISIS: i32 = 100;
const PRIORITY_REPLY: i32 = 10;
const PRIORITY_RITUAL: i32 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    info!("solace companion starting");

    let store_path = std::env::var("SOLACE_STORE")
        .unwrap_or_else(|_| "solace_store.json".into())
        .into();
    let mut store = CompanionStore::new(store_path);
    if let Err(e) = store.load() {
        warn!("store unreadable, starting fresh: {}", e);
    }

    let config = SessionConfig::default();
    let mic = MicrophoneInput::new();
    let voice_mode = mic.is_available() && std::env::var("SOLACE_TEXT_MODE").is_err();

    // Capture events flow into the session; transcripts come either from
    // the microphone pipeline or from stdin in text mode.
    let (cap_tx, cap_rx) = mpsc::unbounded_channel();
    let (device, capture, feed): (
        Box<dyn CaptureDevice>,
        Box<dyn SpeechCapture>,
        Option<CaptureFeed>,
    ) = if voice_mode {
        let transcriber = Arc::new(HttpTranscriber::new(
            std::env::var("SOLACE_STT_URL").unwrap_or_else(|_| "http://localhost:8081".into()),
        ));
        let capture = LocalSpeechCapture::new(cap_tx, transcriber, config.silence_timeout);
        (Box::new(mic), Box::new(capture), None)
    } else {
        info!("no microphone (or text mode forced); reading utterances from stdin");
        let (capture, feed) = ChannelCapture::new(cap_tx);
        (
            Box::new(ScriptedDevice::granted()),
            Box::new(capture),
            Some(feed),
        )
    };

    let (sink_tx, sink_rx) = mpsc::unbounded_channel();
    let sink: Box<dyn AudioSink> = if voice_mode {
        Box::new(SpeakerSink::new(sink_tx))
    } else {
        Box::new(ScriptedSink::auto_completing(sink_tx))
    };
    let mut queue = PlaybackQueue::new(sink, sink_rx);
    let mut queue_rx = queue.subscribe();

    let synthesizer: Box<dyn SpeechSynthesizer> = match std::env::var("SOLACE_TTS_URL") {
        Ok(url) => Box::new(HttpSynthesizer::new(
            url,
            std::env::var("SOLACE_VOICE").unwrap_or_else(|_| "warm".into()),
        )),
        Err(_) => Box::new(CannedSynthesizer::silent()),
    };

    let mut session = VoiceSession::new(config, device, capture, cap_rx);
    let mut session_rx = session.subscribe();
    session.initialize().await?;

    let mut engine = DialogueEngine::new(
        std::env::var("SOLACE_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0x50_1a_ce),
    );
    let mut ctx = DialogueContext::new();
    let mut pacer: Option<SegmentPacer> = None;
    // Clip id of the ritual segment currently awaited, so ordinary replies
    // finishing never advance the pacer.
    let mut pending_segment: Option<uuid::Uuid> = None;

    // stdin lines for text mode.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    if feed.is_some() {
        std::thread::spawn(move || {
            use std::io::BufRead;
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if !line.trim().is_empty() => {
                        if line_tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
    }

    let mut cadence = tokio::time::interval(Duration::from_millis(50));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("ready; press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cadence.tick() => {}
        }

        // 1. Text-mode utterances arrive as scripted transcripts.
        while let Ok(line) = line_rx.try_recv() {
            if line == "/ritual" {
                let (started, first_clip) =
                    begin_ritual(&mut queue, synthesizer.as_ref()).await;
                pacer = Some(started);
                pending_segment = first_clip;
                continue;
            }
            if matches!(session.state(), VoiceState::Idle | VoiceState::WakeWord) {
                if let Err(e) = session.activate().await {
                    warn!("activation failed: {}", e);
                    continue;
                }
            }
            if let Some(feed) = &feed {
                feed.push_transcript(&line, true);
            }
        }

        // 2. Drain session internals (capture events, retry timers).
        session.pump();

        // 3. React to what the session observed.
        while let Ok(event) = session_rx.try_recv() {
            match event {
                SessionEvent::Transcript { text, is_final } if is_final => {
                    let reply = engine.respond(&mut ctx, &text, store.recent_tools());
                    if let Some(suggestion) = &reply.suggestion {
                        info!(
                            "suggesting {} (confidence {:.2})",
                            suggestion.tool_id, suggestion.confidence
                        );
                        if let Err(e) = store.note_tool_suggested(&suggestion.tool_id) {
                            warn!("could not persist suggestion: {}", e);
                        }
                    }
                    session.begin_thinking();
                    println!("solace> {}", reply.text);
                    if let Some(assessment) = &reply.crisis {
                        for resource in &assessment.resources {
                            println!("        {}: {}", resource.name, resource.contact);
                        }
                    }

                    match synthesizer.synthesize(&reply.text).await {
                        Ok(clip) => {
                            let (priority, mode) = if reply.crisis.is_some() {
                                (PRIORITY_CRISIS, EnqueueMode::Interrupt)
                            } else {
                                (PRIORITY_REPLY, EnqueueMode::Queue)
                            };
                            queue.enqueue(QueueEntry::new(clip, priority, mode));
                        }
                        Err(e) => {
                            warn!("synthesis failed, reply stays on screen: {}", e);
                            session.finish_turn();
                        }
                    }
                }
                SessionEvent::WakeWordDetected { phrase } => {
                    info!("wake phrase '{}' heard, opening capture", phrase);
                    if let Err(e) = session.activate().await {
                        warn!("wake activation failed: {}", e);
                    }
                }
                SessionEvent::Failed(err) => warn!("session error surfaced: {}", err),
                SessionEvent::RecoveryScheduled { attempt, delay } => {
                    info!("self-healing attempt {} in {:?}", attempt, delay);
                }
                _ => {}
            }
        }

        // 4. Playback completions drive the session and the pacer.
        queue.pump();
        while let Ok(event) = queue_rx.try_recv() {
            match event {
                PlaybackEvent::Started(_) => session.on_playback_started(),
                PlaybackEvent::Finished(id)
                | PlaybackEvent::Failed(id, _)
                | PlaybackEvent::Stopped(id) => {
                    if !queue.state().is_playing {
                        session.on_playback_finished();
                    }
                    if pending_segment == Some(id) {
                        pending_segment = None;
                        if let Some(active) = pacer.as_mut() {
                            active.on_segment_finished();
                        }
                    }
                }
            }
        }

        // 5. Pacer gaps elapse into the next ritual segment.
        if let Some(active) = pacer.as_mut() {
            if let Some(segment) = active.pump() {
                let text = segment.text.clone();
                pending_segment = enqueue_segment(&mut queue, synthesizer.as_ref(), &text).await;
            }
        }
        if pacer.as_ref().is_some_and(|p| p.is_finished()) {
            if let Some(finished) = pacer.take() {
                let completion = RitualCompletion {
                    date: chrono::Local::now().format("%Y-%m-%d").to_string(),
                    ritual_id: finished.ritual_id().to_string(),
                    segments_played: finished.segments_played(),
                };
                if let Err(e) = store.record_ritual_completion(completion) {
                    warn!("could not record ritual completion: {}", e);
                }
            }
        }
    }

    info!("shutting down");
    if let Some(mut active) = pacer.take() {
        active.cancel();
    }
    queue.stop();
    session.reset();
    Ok(())
}

async fn begin_ritual(
    queue: &mut PlaybackQueue<Box<dyn AudioSink>>,
    synthesizer: &dyn SpeechSynthesizer,
) -> (SegmentPacer, Option<uuid::Uuid>) {
    let segments = vec![
        RitualSegment {
            text: "Settle into a comfortable position and let your eyes soften.".into(),
        },
        RitualSegment {
            text: "Breathe in slowly through your nose, and out through your mouth.".into(),
        },
        RitualSegment {
            text: "Notice three things you can feel, and let the day loosen its grip.".into(),
        },
    ];
    let mut pacer = SegmentPacer::new("evening_winddown", segments, Duration::from_secs(2));
    let mut first_clip = None;
    if let Some(first) = pacer.begin() {
        let text = first.text.clone();
        first_clip = enqueue_segment(queue, synthesizer, &text).await;
    }
    (pacer, first_clip)
}

async fn enqueue_segment(
    queue: &mut PlaybackQueue<Box<dyn AudioSink>>,
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
) -> Option<uuid::Uuid> {
    match synthesizer.synthesize(text).await {
        Ok(clip) => Some(queue.enqueue(QueueEntry::new(clip, PRIORITY_RITUAL, EnqueueMode::Queue))),
        Err(e) => {
            warn!("segment synthesis failed: {}", e);
            None
        }
    }
}
