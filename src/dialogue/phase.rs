use serde::{Deserialize, Serialize};

/// Conversational stage. Gates what kind of content a turn may return:
/// connect never guides, guide is the only stage allowed to suggest a tool,
/// empower reflects rather than introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialoguePhase {
    Connect,
    Understand,
    Guide,
    Empower,
}

impl DialoguePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            DialoguePhase::Connect => "connect",
            DialoguePhase::Understand => "understand",
            DialoguePhase::Guide => "guide",
            DialoguePhase::Empower => "empower",
        }
    }
}

/// Pure: the phase is always recomputed from the context, never stored,
/// so replaying the same turn is idempotent. Strong emotion accelerates
/// (guide by turn 3 instead of 4); turn one is always connect.
pub fn phase_for(turn_count: u32, has_strong_emotion: bool) -> DialoguePhase {
    if turn_count <= 1 {
        return DialoguePhase::Connect;
    }
    if has_strong_emotion {
        match turn_count {
            2 => DialoguePhase::Understand,
            3..=4 => DialoguePhase::Guide,
            _ => DialoguePhase::Empower,
        }
    } else {
        match turn_count {
            2..=3 => DialoguePhase::Understand,
            4..=5 => DialoguePhase::Guide,
            _ => DialoguePhase::Empower,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_one_is_connect_regardless_of_emotion() {
        assert_eq!(phase_for(1, false), DialoguePhase::Connect);
        assert_eq!(phase_for(1, true), DialoguePhase::Connect);
        assert_eq!(phase_for(0, true), DialoguePhase::Connect);
    }

    #[test]
    fn strong_emotion_reaches_guide_one_turn_earlier() {
        assert_eq!(phase_for(3, false), DialoguePhase::Understand);
        assert_eq!(phase_for(3, true), DialoguePhase::Guide);
        assert_eq!(phase_for(4, false), DialoguePhase::Guide);
    }

    #[test]
    fn phase_is_monotone_in_turn_count() {
        for &strong in &[false, true] {
            let mut prev = phase_for(0, strong);
            for turn in 1..12 {
                let cur = phase_for(turn, strong);
                assert!(
                    phase_rank(cur) >= phase_rank(prev),
                    "phase regressed at turn {turn}"
                );
                prev = cur;
            }
        }
    }

    fn phase_rank(p: DialoguePhase) -> u8 {
        match p {
            DialoguePhase::Connect => 0,
            DialoguePhase::Understand => 1,
            DialoguePhase::Guide => 2,
            DialoguePhase::Empower => 3,
        }
    }
}
