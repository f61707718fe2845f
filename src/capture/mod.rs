//! Boundary to the platform's speech-capture service and microphone.
//!
//! The session machine only sees the traits here. The cpal-backed
//! implementations live in `device`; VAD framing in `activity`.

pub mod activity;
pub mod device;
pub mod recognizer;
pub mod scripted;

use crate::error::{VoiceError, VoiceErrorKind, VoiceResult};
use crate::session::state::PermissionStatus;
use async_trait::async_trait;

/// Options handed to the recognition service on start.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// Error codes the recognition service can report. `NoSpeech` and `Aborted`
/// are benign: the session returns to rest without raising an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    Other(String),
}

impl CaptureErrorCode {
    pub fn is_benign(&self) -> bool {
        matches!(self, CaptureErrorCode::NoSpeech | CaptureErrorCode::Aborted)
    }

    pub fn into_error(self) -> VoiceError {
        let (kind, msg) = match &self {
            CaptureErrorCode::AudioCapture => {
                (VoiceErrorKind::MicrophoneBusy, "audio capture failed")
            }
            CaptureErrorCode::Network => (VoiceErrorKind::Network, "recognition network failure"),
            CaptureErrorCode::NotAllowed => {
                (VoiceErrorKind::PermissionDenied, "recognition not allowed")
            }
            CaptureErrorCode::NoSpeech | CaptureErrorCode::Aborted => {
                (VoiceErrorKind::Recognition, "benign recognition stop")
            }
            CaptureErrorCode::Other(m) => {
                return VoiceError::new(VoiceErrorKind::Recognition, m.clone())
            }
        };
        VoiceError::new(kind, msg)
    }
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Result { transcript: String, is_final: bool },
    Error(CaptureErrorCode),
    Ended,
}

/// The recognition service itself. Implementations emit `CaptureEvent`s on
/// the channel they were constructed with; `start` must not be called while
/// a previous run is still active.
pub trait SpeechCapture: Send {
    fn is_supported(&self) -> bool;
    fn start(&mut self, opts: &CaptureOptions) -> VoiceResult<()>;
    /// Graceful stop: flush a pending final result, then emit `Ended`.
    fn stop(&mut self);
    /// Hard stop: discard everything in flight.
    fn abort(&mut self);
}

/// A warm capture stream. Holding one means holding the device exclusively;
/// dropping it releases the device.
pub trait WarmStream: Send {
    /// Input level (RMS) over recently captured samples, for UI meters.
    fn level(&mut self) -> f32;
}

/// Microphone access: presence, permission, and warm-up acquisition.
/// Desktop hosts have no OS prompt, so `request_permission` typically
/// resolves from device presence; prompt-based hosts suspend here.
#[async_trait]
pub trait CaptureDevice: Send {
    fn is_available(&self) -> bool;
    /// Non-prompting inspection of the current permission state.
    fn query_permission(&self) -> PermissionStatus {
        PermissionStatus::Unknown
    }
    async fn request_permission(&mut self) -> PermissionStatus;
    async fn acquire_warmup(&mut self) -> VoiceResult<Box<dyn WarmStream>>;
}
