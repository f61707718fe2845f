/// A feature of the surrounding app the companion can point at.
pub struct ToolProfile {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
    pub emotions: &'static [&'static str],
    pub topics: &'static [&'static str],
    pub invitation: &'static str,
}

pub const TOOLS: &[ToolProfile] = &[
    ToolProfile {
        id: "breathing",
        keywords: &["breathe", "breathing", "panic", "racing", "heart pounding", "calm down"],
        emotions: &["anxious", "overwhelmed"],
        topics: &["stress", "work"],
        invitation: "Would you like to try a two-minute guided breathing exercise together?",
    },
    ToolProfile {
        id: "journal",
        keywords: &["write", "journal", "thoughts spinning", "can't stop thinking", "process"],
        emotions: &["sad", "angry", "anxious"],
        topics: &["relationship", "family", "grief"],
        invitation: "Putting this in your journal might help untangle it — want me to open a prompt for you?",
    },
    ToolProfile {
        id: "sleep_story",
        keywords: &["sleep", "insomnia", "can't sleep", "awake at night", "tired"],
        emotions: &["anxious", "overwhelmed"],
        topics: &["sleep", "night"],
        invitation: "A wind-down story might make tonight easier — shall I queue one up?",
    },
    ToolProfile {
        id: "mood_checkin",
        keywords: &["mood", "track", "pattern", "lately", "every day"],
        emotions: &["sad", "lonely"],
        topics: &["habits", "routine"],
        invitation: "Logging this in your mood check-in could reveal the pattern — want to do a quick one?",
    },
    ToolProfile {
        id: "ritual",
        keywords: &["meditate", "meditation", "ritual", "practice", "ground", "grounding"],
        emotions: &["calm", "hopeful", "overwhelmed"],
        topics: &["morning", "evening", "routine"],
        invitation: "Your evening ritual is a good fit for this — would you like to begin it now?",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSuggestion {
    pub tool_id: String,
    pub message: String,
    pub confidence: f32,
    pub reason: String,
}

const KEYWORD_WEIGHT: f32 = 3.0;
const EMOTION_WEIGHT: f32 = 1.5;
const TOPIC_WEIGHT: f32 = 1.0;
const RECENCY_DAMPING: f32 = 0.3;
const SUGGESTION_THRESHOLD: f32 = 2.5;

/// Score every tool against this turn and return the best one if it clears
/// the bar. The weights are tuned so an emotion match alone (1.5) can never
/// cross the threshold.
pub fn suggest(
    text: &str,
    emotions: &[String],
    topics: &[String],
    recently_suggested: &[String],
) -> Option<ToolSuggestion> {
    let lower = text.to_lowercase();

    let mut best: Option<(f32, &ToolProfile, String)> = None;
    for tool in TOOLS {
        let keyword_hits = tool.keywords.iter().filter(|k| lower.contains(*k)).count();
        let emotion_hit = tool
            .emotions
            .iter()
            .any(|e| emotions.iter().any(|found| found == e));
        let topic_hits = tool
            .topics
            .iter()
            .filter(|t| topics.iter().any(|seen| seen == *t))
            .count();

        let mut score = KEYWORD_WEIGHT * keyword_hits as f32
            + EMOTION_WEIGHT * if emotion_hit { 1.0 } else { 0.0 }
            + TOPIC_WEIGHT * topic_hits as f32;

        let damped = recently_suggested.iter().any(|id| id == tool.id);
        if damped {
            score *= RECENCY_DAMPING;
        }

        if score <= 0.0 {
            continue;
        }
        let reason = format!(
            "keywords:{keyword_hits} emotion:{} topics:{topic_hits}{}",
            u8::from(emotion_hit),
            if damped { " damped" } else { "" }
        );
        match &best {
            Some((top, _, _)) if *top >= score => {}
            _ => best = Some((score, tool, reason)),
        }
    }

    let (score, tool, reason) = best?;
    if score < SUGGESTION_THRESHOLD {
        return None;
    }
    Some(ToolSuggestion {
        tool_id: tool.id.to_string(),
        message: tool.invitation.to_string(),
        confidence: (score / 6.0).min(1.0),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_alone_never_suggests() {
        let suggestion = suggest(
            "everything is fine really",
            &["anxious".to_string()],
            &[],
            &[],
        );
        assert!(suggestion.is_none());
    }

    #[test]
    fn keyword_hit_clears_the_bar() {
        let suggestion = suggest("I just can't sleep at night", &[], &[], &[]).unwrap();
        assert_eq!(suggestion.tool_id, "sleep_story");
        assert!(suggestion.confidence > 0.0);
    }

    #[test]
    fn recency_damping_suppresses_repeat() {
        let recent = vec!["sleep_story".to_string()];
        // One keyword hit: 3.0 * 0.3 = 0.9, below the bar.
        assert!(suggest("I can't sleep", &[], &[], &recent).is_none());
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let text = "I can't sleep, insomnia all week, lying awake at night, so tired";
        let s = suggest(text, &["anxious".to_string()], &["sleep".to_string()], &[]).unwrap();
        assert!(s.confidence <= 1.0);
    }
}
