use std::collections::HashMap;

use tracing::{debug, info};

use crate::crisis::{self, CrisisAssessment, CrisisLevel};

use super::emotion;
use super::phase::{phase_for, DialoguePhase};
use super::pools;
use super::selector::{AntiRepeatPool, IndexSource, SeededPicker};
use super::tools::{self, ToolSuggestion};

/// Running state of one conversation. Reset wholesale when the user starts
/// a new session; the phase is never stored here, always recomputed.
#[derive(Default)]
pub struct DialogueContext {
    pub turn_count: u32,
    /// Chronological, as detected.
    pub detected_emotions: Vec<String>,
    pub recent_topics: Vec<String>,
    recent_picks: HashMap<&'static str, AntiRepeatPool>,
    last_phase: Option<DialoguePhase>,
}

impl DialogueContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn current_emotion(&self) -> Option<&str> {
        self.detected_emotions.last().map(String::as_str)
    }

    pub fn has_strong_emotion(&self) -> bool {
        self.current_emotion().is_some_and(emotion::is_strong)
    }
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct CompanionReply {
    pub text: String,
    pub phase: DialoguePhase,
    pub suggestion: Option<ToolSuggestion>,
    pub crisis: Option<CrisisAssessment>,
}

/// Words that count as conversation topics for tool scoring.
const TOPIC_LEXICON: &[&str] = &[
    "work", "sleep", "family", "relationship", "grief", "stress", "morning", "evening", "night",
    "routine", "habits", "money", "health",
];

/// Probability of decorating a turn with a bridge or shift acknowledgment.
const FLOURISH_CHANCE: f32 = 0.4;

pub struct DialogueEngine {
    picker: Box<dyn IndexSource>,
}

impl DialogueEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            picker: Box::new(SeededPicker::new(seed)),
        }
    }

    /// Injectable randomness for deterministic hosts and tests.
    pub fn with_picker(picker: Box<dyn IndexSource>) -> Self {
        Self { picker }
    }

    /// Run one user utterance through the full turn pipeline: crisis gate,
    /// emotion/topic tracking, phase computation, anti-repetition selection,
    /// and (guide only) tool-suggestion scoring.
    ///
    /// `recently_suggested` is the persisted recent-tool window; the caller
    /// records the returned suggestion back into it.
    pub fn respond(
        &mut self,
        ctx: &mut DialogueContext,
        input: &str,
        recently_suggested: &[String],
    ) -> CompanionReply {
        ctx.turn_count += 1;

        // Hard override: a crisis verdict replaces phase-based selection
        // entirely for this turn.
        let assessment = crisis::assess(input);
        if assessment.level != CrisisLevel::None {
            info!(
                "crisis override at turn {} (level {:?})",
                ctx.turn_count, assessment.level
            );
            return CompanionReply {
                text: assessment.response.clone(),
                phase: phase_for(ctx.turn_count, ctx.has_strong_emotion()),
                suggestion: None,
                crisis: Some(assessment),
            };
        }

        let previous_emotion = ctx.current_emotion().map(str::to_owned);
        for found in emotion::detect(input) {
            if ctx.detected_emotions.last() != Some(&found) {
                ctx.detected_emotions.push(found);
            }
        }
        self.track_topics(ctx, input);

        let phase = phase_for(ctx.turn_count, ctx.has_strong_emotion());
        let (pool_key, pool) = pools::pool_for(phase, ctx.current_emotion());
        let index = ctx
            .recent_picks
            .entry(pool_key)
            .or_default()
            .select(pool.len(), self.picker.as_mut());
        debug!("turn {}: phase {:?}, pool {} [{}]", ctx.turn_count, phase, pool_key, index);

        let mut text = pool[index].to_string();
        text = self.decorate(ctx, phase, previous_emotion.as_deref(), text);

        let suggestion = if phase == DialoguePhase::Guide {
            tools::suggest(
                input,
                &ctx.detected_emotions,
                &ctx.recent_topics,
                recently_suggested,
            )
        } else {
            None
        };
        if let Some(s) = &suggestion {
            text.push(' ');
            text.push_str(&s.message);
        }

        ctx.last_phase = Some(phase);
        CompanionReply {
            text,
            phase,
            suggestion,
            crisis: None,
        }
    }

    fn track_topics(&self, ctx: &mut DialogueContext, input: &str) {
        let lower = input.to_lowercase();
        for topic in TOPIC_LEXICON {
            if lower.contains(topic) && !ctx.recent_topics.iter().any(|t| t == topic) {
                ctx.recent_topics.push((*topic).to_string());
            }
        }
        // Bounded: only the freshest topics matter for overlap scoring.
        while ctx.recent_topics.len() > 8 {
            ctx.recent_topics.remove(0);
        }
    }

    /// Optional prefixes, applied probabilistically. Omitting them breaks
    /// nothing; they only smooth the seams.
    fn decorate(
        &mut self,
        ctx: &DialogueContext,
        phase: DialoguePhase,
        previous_emotion: Option<&str>,
        text: String,
    ) -> String {
        let mut prefixes: Vec<String> = Vec::new();

        if let (Some(prev), Some(cur)) = (previous_emotion, ctx.current_emotion()) {
            if prev != cur && self.picker.chance() < FLOURISH_CHANCE {
                prefixes.push(pools::emotion_shift_ack(prev, cur));
            }
        }
        if ctx.last_phase.is_some() && ctx.last_phase != Some(phase) {
            if let Some(bridge) = pools::bridge_for(phase) {
                if self.picker.chance() < FLOURISH_CHANCE {
                    prefixes.push(bridge.to_string());
                }
            }
        }

        if prefixes.is_empty() {
            text
        } else {
            format!("{} {}", prefixes.join(" "), text)
        }
    }
}
