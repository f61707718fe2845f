use serde::{Deserialize, Serialize};

/// The explicit lifecycle states of one voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceState {
    /// Session object exists, platform not checked yet.
    Uninitialized,
    /// Capability and permission checks in progress.
    Initializing,
    /// Ready, microphone released, nothing in flight.
    Idle,
    /// Passive listening for the wake phrase. Microphone semantics match Idle.
    WakeWord,
    /// Capture device acquired ahead of recognition to hide start latency.
    WarmingUp,
    /// Recognition service active, device owned by it exclusively.
    Listening,
    /// Final transcript received, content selection running.
    Processing,
    /// Waiting on the synthesis collaborator.
    Thinking,
    /// A clip from the playback queue is audible.
    Speaking,
    /// A typed error is latched in `last_error`.
    Error,
    /// Self-healing attempt in progress.
    Recovering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionStatus {
    Unknown,
    Prompt,
    Granted,
    Denied,
}

/// Governs which transitions are legal. Requests, not forces: an attempt
/// from a state that does not list the target is rejected, never coerced.
pub struct TransitionGraph;

impl TransitionGraph {
    /// The exact set of states legal from `from`.
    pub fn legal_targets(from: VoiceState) -> &'static [VoiceState] {
        use VoiceState::*;
        match from {
            Uninitialized => &[Initializing],
            Initializing => &[Idle, WakeWord, Error],
            Idle => &[WakeWord, WarmingUp, Listening, Thinking, Speaking, Error],
            WakeWord => &[Idle, WarmingUp, Listening, Thinking, Speaking, Error],
            WarmingUp => &[Listening, Idle, WakeWord, Error],
            Listening => &[Processing, Idle, WakeWord, Error],
            Processing => &[Thinking, Idle, WakeWord, Error],
            Thinking => &[Speaking, Idle, WakeWord, Error],
            Speaking => &[Idle, WakeWord, Error],
            Error => &[Recovering, Idle],
            Recovering => &[Idle, WakeWord, Error],
        }
    }

    pub fn permits(from: VoiceState, to: VoiceState) -> bool {
        Self::legal_targets(from).contains(&to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_only_initializes() {
        assert!(TransitionGraph::permits(
            VoiceState::Uninitialized,
            VoiceState::Initializing
        ));
        assert!(!TransitionGraph::permits(
            VoiceState::Uninitialized,
            VoiceState::Listening
        ));
    }

    #[test]
    fn error_reaches_recovering_not_listening() {
        assert!(TransitionGraph::permits(VoiceState::Error, VoiceState::Recovering));
        assert!(!TransitionGraph::permits(VoiceState::Error, VoiceState::Listening));
    }

    #[test]
    fn speaking_returns_to_rest_states_only() {
        assert!(TransitionGraph::permits(VoiceState::Speaking, VoiceState::Idle));
        assert!(TransitionGraph::permits(VoiceState::Speaking, VoiceState::WakeWord));
        assert!(!TransitionGraph::permits(VoiceState::Speaking, VoiceState::Processing));
    }
}
