use std::time::Duration;

use solace::capture::scripted::{CaptureFeed, ChannelCapture, ScriptedDevice};
use solace::capture::CaptureErrorCode;
use solace::error::VoiceErrorKind;
use solace::session::{PermissionStatus, SessionConfig, SessionEvent, VoiceSession, VoiceState};
use tokio::sync::mpsc;

fn test_config() -> SessionConfig {
    SessionConfig {
        retry_base_delay: Duration::from_millis(10),
        max_retries: 2,
        ..SessionConfig::default()
    }
}

struct Harness {
    session: VoiceSession,
    feed: CaptureFeed,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

fn harness_with_device(device: ScriptedDevice) -> Harness {
    let (cap_tx, cap_rx) = mpsc::unbounded_channel();
    let (capture, feed) = ChannelCapture::new(cap_tx);
    let mut session = VoiceSession::new(
        test_config(),
        Box::new(device),
        Box::new(capture),
        cap_rx,
    );
    let events = session.subscribe();
    Harness {
        session,
        feed,
        events,
    }
}

fn harness() -> Harness {
    harness_with_device(ScriptedDevice::granted())
}

impl Harness {
    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.events.try_recv() {
            out.push(ev);
        }
        out
    }
}

#[tokio::test]
async fn initialize_lands_in_idle() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    assert_eq!(h.session.state(), VoiceState::Idle);
    assert_eq!(h.session.retry_count(), 0);
    assert!(h.session.last_error().is_none());
}

#[tokio::test]
async fn unsupported_platform_is_latched_without_retry() {
    let (cap_tx, cap_rx) = mpsc::unbounded_channel();
    let (capture, _feed) = ChannelCapture::unsupported(cap_tx);
    let mut session = VoiceSession::new(
        test_config(),
        Box::new(ScriptedDevice::granted()),
        Box::new(capture),
        cap_rx,
    );
    let mut events = session.subscribe();

    let err = session.initialize().await.unwrap_err();
    assert_eq!(err.kind, VoiceErrorKind::PlatformUnsupported);
    assert!(!err.is_recoverable());
    assert_eq!(session.state(), VoiceState::Error);

    // No self-healing for a non-recoverable class.
    let mut scheduled = false;
    while let Ok(ev) = events.try_recv() {
        if matches!(ev, SessionEvent::RecoveryScheduled { .. }) {
            scheduled = true;
        }
    }
    assert!(!scheduled);
}

#[tokio::test]
async fn activate_reaches_listening_and_hands_off_the_device() {
    let device = ScriptedDevice::granted();
    let probe = std::sync::Arc::clone(&device.probe);
    let mut h = harness_with_device(device);
    h.session.initialize().await.unwrap();

    h.session.activate().await.unwrap();
    assert_eq!(h.session.state(), VoiceState::Listening);
    assert!(h.feed.is_active(), "recognition must be running");

    // Warm-up acquired the device and released it before recognition
    // started; it is never held by both.
    assert!(!probe.currently_held());
    assert_eq!(
        probe.acquisitions.load(std::sync::atomic::Ordering::SeqCst),
        probe.releases.load(std::sync::atomic::Ordering::SeqCst)
    );
    assert!(!h.session.microphone_warmed());
}

#[tokio::test]
async fn permission_is_requested_once_while_granted() {
    let device = ScriptedDevice::granted();
    let probe = std::sync::Arc::clone(&device.probe);
    let mut h = harness_with_device(device);
    h.session.initialize().await.unwrap();

    h.session.activate().await.unwrap();
    h.session.stop_listening();
    h.session.activate().await.unwrap();
    h.session.stop_listening();

    assert_eq!(h.session.permission(), PermissionStatus::Granted);
    assert_eq!(
        probe.prompts.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "no re-prompt while granted"
    );
}

#[tokio::test]
async fn stop_listening_rejected_from_idle_accepted_from_listening() {
    let mut h = harness();
    h.session.initialize().await.unwrap();

    assert!(!h.session.stop_listening(), "idle must reject stop_listening");

    h.session.activate().await.unwrap();
    assert_eq!(h.session.state(), VoiceState::Listening);
    assert!(h.session.stop_listening());
    assert_eq!(h.session.state(), VoiceState::Idle);
}

#[tokio::test]
async fn interrupted_listening_returns_to_wakeword_when_enabled() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.enable_wake_word().await.unwrap();
    assert_eq!(h.session.state(), VoiceState::WakeWord);

    h.session.activate().await.unwrap();
    assert!(h.session.stop_listening());
    assert_eq!(h.session.state(), VoiceState::WakeWord);

    h.session.disable_wake_word();
    assert_eq!(h.session.state(), VoiceState::Idle);
}

#[tokio::test]
async fn final_transcript_moves_to_processing_and_surfaces_text() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.activate().await.unwrap();

    h.feed.push_transcript("I had a rough day", true);
    h.session.pump();

    assert_eq!(h.session.state(), VoiceState::Processing);
    let saw_transcript = h.drain().iter().any(|ev| {
        matches!(ev, SessionEvent::Transcript { text, is_final: true } if text == "I had a rough day")
    });
    assert!(saw_transcript);
}

#[tokio::test]
async fn benign_no_speech_returns_to_rest_without_error() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.activate().await.unwrap();

    h.feed.push_error(CaptureErrorCode::NoSpeech);
    h.session.pump();

    assert_eq!(h.session.state(), VoiceState::Idle);
    assert!(h.session.last_error().is_none());
    assert!(!h
        .drain()
        .iter()
        .any(|ev| matches!(ev, SessionEvent::Failed(_))));
}

#[tokio::test(start_paused = true)]
async fn recoverable_error_self_heals_with_backoff() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.activate().await.unwrap();

    h.feed.push_error(CaptureErrorCode::Network);
    h.session.pump();
    assert_eq!(h.session.state(), VoiceState::Error);

    let scheduled = h.drain().into_iter().find_map(|ev| match ev {
        SessionEvent::RecoveryScheduled { attempt, delay } => Some((attempt, delay)),
        _ => None,
    });
    assert_eq!(scheduled, Some((1, Duration::from_millis(10))));

    // Let the backoff timer elapse, then drain the wakeup.
    tokio::time::sleep(Duration::from_millis(15)).await;
    h.session.pump();

    assert_eq!(h.session.state(), VoiceState::Idle);
    assert_eq!(h.session.retry_count(), 0, "reset on re-entering idle");
    assert!(h.session.last_error().is_none());
}

#[tokio::test]
async fn queued_transition_requests_preserve_order() {
    let mut h = harness();
    h.session.initialize().await.unwrap();

    // Direct illegal request is rejected synchronously.
    assert!(!h.session.request_transition(VoiceState::Processing));

    // A legal chain applies in submission order.
    assert!(h.session.request_transition(VoiceState::WarmingUp));
    assert!(h.session.request_transition(VoiceState::Listening));
    assert_eq!(h.session.state(), VoiceState::Listening);

    let states: Vec<VoiceState> = h
        .drain()
        .into_iter()
        .filter_map(|ev| match ev {
            SessionEvent::StateChanged { state, .. } => Some(state),
            _ => None,
        })
        .collect();
    let tail = &states[states.len() - 2..];
    assert_eq!(tail, &[VoiceState::WarmingUp, VoiceState::Listening]);
}

#[tokio::test]
async fn reset_is_accepted_from_anywhere_and_clears_state() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.activate().await.unwrap();
    h.feed.push_error(CaptureErrorCode::Network);
    h.session.pump();
    assert_eq!(h.session.state(), VoiceState::Error);

    h.session.reset();
    assert_eq!(h.session.state(), VoiceState::Idle);
    assert!(h.session.last_error().is_none());
    assert_eq!(h.session.retry_count(), 0);
    assert!(!h.session.microphone_warmed());
}

#[tokio::test]
async fn speaking_notifications_fire_on_entry_and_exit() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.activate().await.unwrap();
    h.feed.push_transcript("hello", true);
    h.session.pump();
    h.session.begin_thinking();

    h.session.on_playback_started();
    assert_eq!(h.session.state(), VoiceState::Speaking);
    h.session.on_playback_finished();
    assert_eq!(h.session.state(), VoiceState::Idle);

    let events = h.drain();
    let started = events
        .iter()
        .position(|e| matches!(e, SessionEvent::SpeakingStarted));
    let ended = events
        .iter()
        .position(|e| matches!(e, SessionEvent::SpeakingEnded));
    assert!(started.is_some() && ended.is_some());
    assert!(started < ended);
}

#[tokio::test]
async fn wake_phrase_in_passive_mode_signals_the_host() {
    let mut h = harness();
    h.session.initialize().await.unwrap();
    h.session.enable_wake_word().await.unwrap();
    assert_eq!(h.session.state(), VoiceState::WakeWord);

    // A passive transcript without the phrase stays quiet.
    h.feed.push_transcript("what a day it has been", true);
    // One that opens with the phrase signals the host to activate.
    h.feed.push_transcript("Hey, Solace! can we talk", true);
    h.session.pump();

    let detections: Vec<String> = h
        .drain()
        .into_iter()
        .filter_map(|ev| match ev {
            SessionEvent::WakeWordDetected { phrase } => Some(phrase),
            _ => None,
        })
        .collect();
    assert_eq!(detections, vec!["hey solace".to_string()]);
    assert_eq!(h.session.state(), VoiceState::WakeWord, "host decides when to activate");
}

#[tokio::test]
async fn permission_denied_is_surfaced_and_not_retried() {
    let mut h = harness_with_device(ScriptedDevice::with_permission(PermissionStatus::Denied));
    h.session.initialize().await.unwrap();

    let err = h.session.activate().await.unwrap_err();
    assert_eq!(err.kind, VoiceErrorKind::PermissionDenied);
    assert_eq!(h.session.state(), VoiceState::Error);
    assert!(!h
        .drain()
        .iter()
        .any(|ev| matches!(ev, SessionEvent::RecoveryScheduled { .. })));
}
