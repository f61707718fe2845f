use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CaptureDevice, CaptureEvent, CaptureOptions, SpeechCapture, WarmStream};
use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};

use super::config::SessionConfig;
use super::state::{PermissionStatus, TransitionGraph, VoiceState};

/// Everything a host can observe about a session. Exactly one subscriber
/// receives each event; subscribing again replaces the previous receiver.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        state: VoiceState,
        previous: VoiceState,
    },
    SpeakingStarted,
    SpeakingEnded,
    Transcript {
        text: String,
        is_final: bool,
    },
    /// A wake phrase opened a passive-listening turn; the host should
    /// activate capture.
    WakeWordDetected {
        phrase: String,
    },
    Failed(VoiceError),
    RecoveryScheduled {
        attempt: u32,
        delay: Duration,
    },
    RecoveryExhausted,
}

enum Wakeup {
    Retry { attempt: u32 },
}

/// The live state of one user's voice interaction.
///
/// Single-threaded and cooperative: every method runs to completion on the
/// caller's task, and the only suspension points are permission requests and
/// device acquisition. Transitions requested while one is being applied are
/// queued and drained by an explicit loop, preserving request order.
pub struct VoiceSession {
    state: VoiceState,
    previous: VoiceState,
    permission: PermissionStatus,
    wake_word_enabled: bool,
    retry_count: u32,
    last_error: Option<VoiceError>,

    config: SessionConfig,
    device: Box<dyn CaptureDevice>,
    capture: Box<dyn SpeechCapture>,
    capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,

    warm_stream: Option<Box<dyn WarmStream>>,
    /// Whether the recognition service currently owns the device.
    capture_active: bool,

    events: Option<mpsc::UnboundedSender<SessionEvent>>,

    pending: VecDeque<VoiceState>,
    applying: bool,

    wakeup_tx: mpsc::UnboundedSender<Wakeup>,
    wakeup_rx: mpsc::UnboundedReceiver<Wakeup>,
    retry_guard: CancellationToken,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        device: Box<dyn CaptureDevice>,
        capture: Box<dyn SpeechCapture>,
        capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    ) -> Self {
        let (wakeup_tx, wakeup_rx) = mpsc::unbounded_channel();
        Self {
            state: VoiceState::Uninitialized,
            previous: VoiceState::Uninitialized,
            permission: PermissionStatus::Unknown,
            wake_word_enabled: false,
            retry_count: 0,
            last_error: None,
            config,
            device,
            capture,
            capture_rx,
            warm_stream: None,
            capture_active: false,
            events: None,
            pending: VecDeque::new(),
            applying: false,
            wakeup_tx,
            wakeup_rx,
            retry_guard: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn previous_state(&self) -> VoiceState {
        self.previous
    }

    pub fn permission(&self) -> PermissionStatus {
        self.permission
    }

    pub fn wake_word_enabled(&self) -> bool {
        self.wake_word_enabled
    }

    pub fn microphone_warmed(&self) -> bool {
        self.warm_stream.is_some()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&VoiceError> {
        self.last_error.as_ref()
    }

    /// Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Where an interruption or a finished turn lands: wake-word mode if it
    /// was active, otherwise idle.
    fn rest_state(&self) -> VoiceState {
        if self.wake_word_enabled {
            VoiceState::WakeWord
        } else {
            VoiceState::Idle
        }
    }

    /// Request a transition. While one is being applied, further requests
    /// queue in FIFO order and are validated against the state they find
    /// when drained. An immediate illegal request returns false.
    pub fn request_transition(&mut self, to: VoiceState) -> bool {
        if self.applying {
            self.pending.push_back(to);
            return true;
        }
        if !TransitionGraph::permits(self.state, to) {
            debug!("transition {:?} -> {:?} rejected", self.state, to);
            return false;
        }

        self.applying = true;
        self.apply(to);
        // Drain as a loop, never by re-entering apply from an event handler.
        while let Some(next) = self.pending.pop_front() {
            if TransitionGraph::permits(self.state, next) {
                self.apply(next);
            } else {
                debug!("queued transition {:?} -> {:?} dropped", self.state, next);
            }
        }
        self.applying = false;
        true
    }

    fn apply(&mut self, to: VoiceState) {
        let prev = self.state;
        self.previous = prev;
        self.state = to;

        if matches!(to, VoiceState::Idle | VoiceState::WakeWord) {
            self.retry_count = 0;
        }

        info!("voice state {:?} -> {:?}", prev, to);
        if prev == VoiceState::Speaking && to != VoiceState::Speaking {
            self.emit(SessionEvent::SpeakingEnded);
        }
        if to == VoiceState::Speaking {
            self.emit(SessionEvent::SpeakingStarted);
        }
        self.emit(SessionEvent::StateChanged {
            state: to,
            previous: prev,
        });

        match to {
            // Passive listening owns the recognition service while resting
            // in wake-word mode.
            VoiceState::WakeWord => {
                if self.wake_word_enabled && !self.capture_active {
                    let opts = CaptureOptions {
                        language: self.config.language.clone(),
                        continuous: true,
                        interim_results: false,
                    };
                    match self.capture.start(&opts) {
                        Ok(()) => self.capture_active = true,
                        // enter_error re-requests a transition; the drain
                        // loop above picks it up instead of recursing.
                        Err(e) => self.enter_error(e),
                    }
                }
            }
            VoiceState::Idle => {
                if self.capture_active {
                    self.capture.stop();
                    self.capture_active = false;
                }
            }
            _ => {}
        }
    }

    /// Capability and permission checks. A host without capture support
    /// latches a non-recoverable error; an already-granted permission
    /// triggers an opportunistic warm-up so the first activation is fast.
    pub async fn initialize(&mut self) -> VoiceResult<()> {
        if !self.request_transition(VoiceState::Initializing) {
            return Err(VoiceError::new(
                VoiceErrorKind::Unknown,
                format!("initialize from {:?}", self.state),
            ));
        }

        if !self.capture.is_supported() {
            let err = VoiceError::new(
                VoiceErrorKind::PlatformUnsupported,
                "speech capture unavailable on this host",
            );
            self.enter_error(err.clone());
            return Err(err);
        }

        if self.permission == PermissionStatus::Unknown {
            self.permission = self.device.query_permission();
        }

        if self.permission == PermissionStatus::Granted && self.warm_stream.is_none() {
            // Best effort; a busy device is not fatal at init time.
            if let Err(e) = self.warm_up().await {
                debug!("opportunistic warm-up skipped: {}", e);
            }
        }

        self.request_transition(self.rest_state());
        Ok(())
    }

    /// The tap-to-talk entry point.
    pub async fn activate(&mut self) -> VoiceResult<()> {
        if !matches!(self.state, VoiceState::Idle | VoiceState::WakeWord) {
            return Err(VoiceError::new(
                VoiceErrorKind::Unknown,
                format!("activate from {:?}", self.state),
            ));
        }

        self.ensure_permission().await?;

        // Passive wake-word recognition hands the device over to the
        // active-listening run.
        if self.capture_active {
            self.capture.abort();
            self.capture_active = false;
        }
        self.request_transition(VoiceState::WarmingUp);

        if self.warm_stream.is_none() {
            if let Err(e) = self.warm_up().await {
                self.enter_error(e.clone());
                return Err(e);
            }
        }

        // The recognition service and the warm-up stream must never hold
        // the device at the same time.
        self.release_warmup();

        let opts = CaptureOptions {
            language: self.config.language.clone(),
            continuous: self.config.continuous || self.wake_word_enabled,
            interim_results: self.config.interim_results,
        };
        if let Err(e) = self.capture.start(&opts) {
            self.enter_error(e.clone());
            return Err(e);
        }
        self.capture_active = true;
        self.request_transition(VoiceState::Listening);
        Ok(())
    }

    pub async fn enable_wake_word(&mut self) -> VoiceResult<()> {
        self.ensure_permission().await?;
        self.wake_word_enabled = true;
        if self.state == VoiceState::Idle {
            self.request_transition(VoiceState::WakeWord);
        }
        Ok(())
    }

    pub fn disable_wake_word(&mut self) {
        self.wake_word_enabled = false;
        if self.state == VoiceState::WakeWord {
            // Idle entry stops the passive capture run.
            self.request_transition(VoiceState::Idle);
        }
    }

    /// Explicit user exit from capture. Rejected outside the capture states.
    pub fn stop_listening(&mut self) -> bool {
        if !matches!(
            self.state,
            VoiceState::WarmingUp | VoiceState::Listening | VoiceState::Processing
        ) {
            return false;
        }
        self.capture.stop();
        self.capture_active = false;
        self.release_warmup();
        self.request_transition(self.rest_state());
        true
    }

    /// Explicit user exit from playback. The host is expected to stop the
    /// playback queue on the resulting SpeakingEnded.
    pub fn stop_speaking(&mut self) -> bool {
        if self.state != VoiceState::Speaking {
            return false;
        }
        self.request_transition(self.rest_state());
        true
    }

    /// Always accepted, from any state. Cancels timers, releases the device,
    /// clears queued transitions and the latched error.
    pub fn reset(&mut self) {
        self.retry_guard.cancel();
        self.retry_guard = CancellationToken::new();
        self.capture.abort();
        self.capture_active = false;
        self.release_warmup();
        self.pending.clear();
        self.last_error = None;
        self.retry_count = 0;

        let prev = self.state;
        if prev != VoiceState::Idle {
            self.previous = prev;
            self.state = VoiceState::Idle;
            if prev == VoiceState::Speaking {
                self.emit(SessionEvent::SpeakingEnded);
            }
            self.emit(SessionEvent::StateChanged {
                state: VoiceState::Idle,
                previous: prev,
            });
            info!("voice state {:?} -> Idle (reset)", prev);
        }
    }

    /// Drain capture events and due self-healing wakeups. The host calls
    /// this from its cadence loop; tests call it after pushing events.
    pub fn pump(&mut self) {
        while let Ok(wakeup) = self.wakeup_rx.try_recv() {
            match wakeup {
                Wakeup::Retry { attempt } => self.attempt_recovery(attempt),
            }
        }
        while let Ok(event) = self.capture_rx.try_recv() {
            self.on_capture_event(event);
        }
    }

    /// Playback observation: a clip from this session started playing.
    pub fn on_playback_started(&mut self) {
        if self.state != VoiceState::Speaking {
            self.request_transition(VoiceState::Speaking);
        }
    }

    /// Playback observation: nothing left audible for this session.
    pub fn on_playback_finished(&mut self) {
        if self.state == VoiceState::Speaking {
            self.request_transition(self.rest_state());
        }
    }

    /// Content selection has begun for the current transcript.
    pub fn begin_thinking(&mut self) -> bool {
        self.request_transition(VoiceState::Thinking)
    }

    /// Abandon a turn that will produce no speech (synthesis failed or the
    /// reply was suppressed): fall back to rest from the content states.
    pub fn finish_turn(&mut self) {
        if matches!(self.state, VoiceState::Processing | VoiceState::Thinking) {
            self.request_transition(self.rest_state());
        }
    }

    fn on_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Result { transcript, is_final } => {
                if is_final && self.state == VoiceState::WakeWord {
                    if let Some(phrase) = self.match_wake_phrase(&transcript) {
                        info!("wake phrase heard: {}", phrase);
                        self.emit(SessionEvent::WakeWordDetected { phrase });
                    }
                    return;
                }
                if is_final && self.state == VoiceState::Listening {
                    self.request_transition(VoiceState::Processing);
                    if !(self.config.continuous || self.wake_word_enabled) {
                        // One-shot recognition ends with the utterance.
                        self.capture.stop();
                    }
                }
                self.emit(SessionEvent::Transcript {
                    text: transcript,
                    is_final,
                });
            }
            CaptureEvent::Error(code) => {
                if code.is_benign() {
                    debug!("benign recognition stop: {:?}", code);
                    if matches!(self.state, VoiceState::Listening | VoiceState::WarmingUp) {
                        self.capture.abort();
                        self.capture_active = false;
                        self.request_transition(self.rest_state());
                    }
                } else {
                    self.enter_error(code.into_error());
                }
            }
            CaptureEvent::Ended => {
                if self.state == VoiceState::Listening {
                    self.capture_active = false;
                    self.request_transition(self.rest_state());
                }
            }
        }
    }

    /// Start-of-utterance match against the configured phrases, on text
    /// normalized to lowercase alphanumerics.
    fn match_wake_phrase(&self, transcript: &str) -> Option<String> {
        let normalized: String = transcript
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        self.config
            .wake_phrases
            .iter()
            .find(|phrase| normalized.starts_with(phrase.as_str()))
            .cloned()
    }

    async fn ensure_permission(&mut self) -> VoiceResult<()> {
        if self.permission == PermissionStatus::Granted {
            return Ok(());
        }
        self.permission = self.device.request_permission().await;
        match self.permission {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Denied => {
                let err = VoiceError::new(
                    VoiceErrorKind::PermissionDenied,
                    "microphone permission denied",
                );
                self.enter_error(err.clone());
                Err(err)
            }
            _ => {
                let err = VoiceError::new(
                    VoiceErrorKind::PermissionDismissed,
                    "microphone permission prompt dismissed",
                );
                self.enter_error(err.clone());
                Err(err)
            }
        }
    }

    async fn warm_up(&mut self) -> VoiceResult<()> {
        let stream = self.device.acquire_warmup().await?;
        self.warm_stream = Some(stream);
        Ok(())
    }

    fn release_warmup(&mut self) {
        // Dropping the stream releases the device.
        self.warm_stream = None;
    }

    fn enter_error(&mut self, err: VoiceError) {
        warn!("session error: {}", err);
        self.capture.abort();
        self.capture_active = false;
        self.release_warmup();
        self.last_error = Some(err.clone());
        self.request_transition(VoiceState::Error);
        self.emit(SessionEvent::Failed(err.clone()));

        if !err.is_recoverable() {
            return;
        }
        if self.retry_count >= self.config.max_retries {
            info!("self-healing exhausted after {} attempts", self.retry_count);
            self.emit(SessionEvent::RecoveryExhausted);
            return;
        }

        let attempt = self.retry_count + 1;
        let delay = self.config.retry_base_delay * 2u32.saturating_pow(self.retry_count);
        self.emit(SessionEvent::RecoveryScheduled { attempt, delay });

        let wakeups = self.wakeup_tx.clone();
        let guard = self.retry_guard.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = wakeups.send(Wakeup::Retry { attempt });
                }
            }
        });
    }

    fn attempt_recovery(&mut self, attempt: u32) {
        if self.state != VoiceState::Error {
            return;
        }
        self.retry_count = attempt;
        self.request_transition(VoiceState::Recovering);

        // Re-run the cheap capability checks. A still-broken host goes back
        // to Error and schedules the next (longer) attempt.
        if self.capture.is_supported() && self.device.is_available() {
            info!("self-healing attempt {} succeeded", attempt);
            self.last_error = None;
            self.request_transition(self.rest_state());
        } else {
            let err = VoiceError::new(
                VoiceErrorKind::MicrophoneBusy,
                format!("self-healing attempt {attempt} failed"),
            );
            self.enter_error(err);
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.retry_guard.cancel();
        self.capture.abort();
    }
}
