use super::phase::DialoguePhase;

/// Candidate texts for one (phase, emotion) pairing. Falls back to the
/// phase's default pool when no emotion-specific pool exists.
pub fn pool_for(phase: DialoguePhase, emotion: Option<&str>) -> (&'static str, &'static [&'static str]) {
    if let Some(emotion) = emotion {
        if let Some(pool) = emotion_pool(phase, emotion) {
            return pool;
        }
    }
    default_pool(phase)
}

fn emotion_pool(
    phase: DialoguePhase,
    emotion: &str,
) -> Option<(&'static str, &'static [&'static str])> {
    let pool: (&'static str, &'static [&'static str]) = match (phase, emotion) {
        (DialoguePhase::Connect, "anxious") => (
            "connect.anxious",
            &[
                "That sounds like a lot to be holding. I'm here. Tell me more about what's been stirring that up.",
                "Thank you for saying that out loud. What does the worry feel like right now?",
                "I'm listening. Where do you notice that anxiety showing up most?",
            ],
        ),
        (DialoguePhase::Connect, "sad") => (
            "connect.sad",
            &[
                "I'm sorry it's been heavy. I'm here with you — what's been weighing on you most?",
                "That sadness deserves some room. Would you tell me more about it?",
                "Thank you for trusting me with that. What's underneath it, do you think?",
            ],
        ),
        (DialoguePhase::Connect, "overwhelmed") => (
            "connect.overwhelmed",
            &[
                "That's a lot landing at once. Start wherever feels easiest.",
                "When everything piles up like that it's hard to know where to begin. What's loudest right now?",
            ],
        ),
        (DialoguePhase::Understand, "anxious") => (
            "understand.anxious",
            &[
                "It makes sense that you'd feel keyed up with all that in the air. What's the worry that keeps circling back?",
                "Anyone carrying that would feel on edge. If the anxiety could talk, what would it be warning you about?",
                "That's a real weight. What would feeling even a little safer look like today?",
            ],
        ),
        (DialoguePhase::Understand, "sad") => (
            "understand.sad",
            &[
                "That loss makes sense to grieve. What do you find yourself missing the most?",
                "It's okay for this to hurt. When does the sadness feel strongest?",
            ],
        ),
        (DialoguePhase::Guide, "anxious") => (
            "guide.anxious",
            &[
                "One thing that helps when the mind races: lengthen the exhale. Breathing out slowly for a count of six tells the body it's safe to settle.",
                "Worry tends to shrink when it's written down. Naming the three loudest worries on paper often loosens their grip.",
            ],
        ),
        (DialoguePhase::Empower, "hopeful") => (
            "empower.hopeful",
            &[
                "You can hear the shift in how you said that — you already know the direction you want to move.",
                "That hope is yours; you built it by showing up for yourself. What's the first small step it points to?",
            ],
        ),
        _ => return None,
    };
    Some(pool)
}

fn default_pool(phase: DialoguePhase) -> (&'static str, &'static [&'static str]) {
    match phase {
        DialoguePhase::Connect => (
            "connect.default",
            &[
                "I'm glad you're here. Tell me what's on your mind.",
                "I'm listening — what's been going on for you?",
                "Thanks for checking in. What would you like to talk through?",
            ],
        ),
        DialoguePhase::Understand => (
            "understand.default",
            &[
                "That makes sense given everything you've described. What part of it feels most pressing?",
                "I hear you. What do you think is really at the center of it?",
                "That's worth sitting with. How long has it been feeling this way?",
            ],
        ),
        DialoguePhase::Guide => (
            "guide.default",
            &[
                "Something small that often helps: pausing for three slow breaths before responding to whatever's hardest.",
                "A gentle practice for moments like this is naming what you can and can't control, and putting your energy on the first list.",
                "It can help to give the feeling a name and a place in the body — observed feelings tend to soften.",
            ],
        ),
        DialoguePhase::Empower => (
            "empower.default",
            &[
                "Listen to what you just said — you already named what you need.",
                "You've carried harder things than this; that insight you just shared is proof.",
                "That's your own wisdom talking. What happens if you trust it this week?",
            ],
        ),
    }
}

/// Optional connective tissue. Never required for correctness.
pub fn bridge_for(to: DialoguePhase) -> Option<&'static str> {
    match to {
        DialoguePhase::Understand => Some("I want to make sure I really get this."),
        DialoguePhase::Guide => Some("Can I offer something that might help?"),
        DialoguePhase::Empower => Some("I keep noticing the strength in how you talk about this."),
        DialoguePhase::Connect => None,
    }
}

pub fn emotion_shift_ack(from: &str, to: &str) -> String {
    format!("I notice things shifted from {from} toward {to} as you spoke.")
}
