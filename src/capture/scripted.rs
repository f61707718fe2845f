//! Deterministic capture doubles: a device with configurable presence and
//! permission, and a capture service fed transcripts by hand. The text-mode
//! driver runs on these; the integration tests script them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};
use crate::session::state::PermissionStatus;

use super::{CaptureErrorCode, CaptureEvent, CaptureOptions, SpeechCapture, WarmStream};

/// Shared counters for asserting on device ownership from outside.
#[derive(Debug, Default)]
pub struct DeviceProbe {
    pub acquisitions: AtomicUsize,
    pub releases: AtomicUsize,
    pub prompts: AtomicUsize,
    pub held: AtomicBool,
}

impl DeviceProbe {
    pub fn currently_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

pub struct ScriptedDevice {
    pub available: bool,
    pub permission: PermissionStatus,
    pub probe: Arc<DeviceProbe>,
    prompt_count: usize,
}

impl ScriptedDevice {
    pub fn granted() -> Self {
        Self::with_permission(PermissionStatus::Granted)
    }

    pub fn with_permission(permission: PermissionStatus) -> Self {
        Self {
            available: true,
            permission,
            probe: Arc::new(DeviceProbe::default()),
            prompt_count: 0,
        }
    }

    pub fn absent() -> Self {
        Self {
            available: false,
            permission: PermissionStatus::Denied,
            probe: Arc::new(DeviceProbe::default()),
            prompt_count: 0,
        }
    }

    pub fn prompts_seen(&self) -> usize {
        self.prompt_count
    }
}

#[async_trait]
impl super::CaptureDevice for ScriptedDevice {
    fn is_available(&self) -> bool {
        self.available
    }

    fn query_permission(&self) -> PermissionStatus {
        // Scripted hosts model a prompting platform.
        if self.available {
            PermissionStatus::Prompt
        } else {
            PermissionStatus::Denied
        }
    }

    async fn request_permission(&mut self) -> PermissionStatus {
        self.prompt_count += 1;
        self.probe.prompts.fetch_add(1, Ordering::SeqCst);
        self.permission
    }

    async fn acquire_warmup(&mut self) -> VoiceResult<Box<dyn WarmStream>> {
        if !self.available {
            return Err(VoiceError::new(VoiceErrorKind::NoMicrophone, "no device"));
        }
        if self.probe.currently_held() {
            return Err(VoiceError::new(
                VoiceErrorKind::MicrophoneBusy,
                "device already held",
            ));
        }
        self.probe.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.probe.held.store(true, Ordering::SeqCst);
        Ok(Box::new(ScriptedWarmStream {
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct ScriptedWarmStream {
    probe: Arc<DeviceProbe>,
}

impl WarmStream for ScriptedWarmStream {
    fn level(&mut self) -> f32 {
        0.0
    }
}

impl Drop for ScriptedWarmStream {
    fn drop(&mut self) {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
        self.probe.held.store(false, Ordering::SeqCst);
    }
}

/// Handle for pushing events into a [`ChannelCapture`] from outside.
#[derive(Clone)]
pub struct CaptureFeed {
    events: mpsc::UnboundedSender<CaptureEvent>,
    active: Arc<AtomicBool>,
}

impl CaptureFeed {
    pub fn push_transcript(&self, text: &str, is_final: bool) {
        if self.active.load(Ordering::SeqCst) {
            let _ = self.events.send(CaptureEvent::Result {
                transcript: text.to_string(),
                is_final,
            });
        }
    }

    pub fn push_error(&self, code: CaptureErrorCode) {
        if self.active.load(Ordering::SeqCst) {
            let _ = self.events.send(CaptureEvent::Error(code));
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A capture service whose results come from a channel instead of a
/// microphone. `start` arms the feed, `stop`/`abort` disarm it.
pub struct ChannelCapture {
    events: mpsc::UnboundedSender<CaptureEvent>,
    active: Arc<AtomicBool>,
    supported: bool,
    pub started: Arc<AtomicUsize>,
    pub last_options: Option<CaptureOptions>,
}

impl ChannelCapture {
    pub fn new(events: mpsc::UnboundedSender<CaptureEvent>) -> (Self, CaptureFeed) {
        let active = Arc::new(AtomicBool::new(false));
        let feed = CaptureFeed {
            events: events.clone(),
            active: Arc::clone(&active),
        };
        (
            Self {
                events,
                active,
                supported: true,
                started: Arc::new(AtomicUsize::new(0)),
                last_options: None,
            },
            feed,
        )
    }

    pub fn unsupported(events: mpsc::UnboundedSender<CaptureEvent>) -> (Self, CaptureFeed) {
        let (mut capture, feed) = Self::new(events);
        capture.supported = false;
        (capture, feed)
    }
}

impl SpeechCapture for ChannelCapture {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, opts: &CaptureOptions) -> VoiceResult<()> {
        if self.active.load(Ordering::SeqCst) {
            return Err(VoiceError::new(
                VoiceErrorKind::MicrophoneBusy,
                "capture already active",
            ));
        }
        self.active.store(true, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.last_options = Some(opts.clone());
        Ok(())
    }

    fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(CaptureEvent::Ended);
        }
    }

    fn abort(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
