use thiserror::Error;

/// Classification of everything that can go wrong while running a voice
/// session. Each kind carries a fixed recoverability verdict: recoverable
/// kinds are eligible for self-healing retries, the rest surface to the
/// caller and stay surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceErrorKind {
    /// The user explicitly refused microphone access.
    PermissionDenied,
    /// The permission prompt was closed without a decision.
    PermissionDismissed,
    /// No capture device is present on this host.
    NoMicrophone,
    /// The capture device is held by another process.
    MicrophoneBusy,
    Network,
    /// Host lacks the capture/synthesis capabilities entirely.
    PlatformUnsupported,
    Recognition,
    Synthesis,
    Timeout,
    Unknown,
}

impl VoiceErrorKind {
    /// Non-recoverable kinds never trigger a self-healing attempt.
    pub fn recoverable(self) -> bool {
        !matches!(
            self,
            VoiceErrorKind::PermissionDenied
                | VoiceErrorKind::PlatformUnsupported
                | VoiceErrorKind::NoMicrophone
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct VoiceError {
    pub kind: VoiceErrorKind,
    pub message: String,
}

impl VoiceError {
    pub fn new(kind: VoiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.recoverable()
    }
}

pub type VoiceResult<T> = Result<T, VoiceError>;
