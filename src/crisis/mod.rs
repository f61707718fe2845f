//! On-device distress screening.
//!
//! Evaluated before any other content logic, entirely from the user's own
//! text, so the escalation path never depends on network or synthesis
//! availability. The pattern wording is replaceable content; the ordered
//! tiers and their precedence are the contract.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CrisisLevel {
    None,
    Low,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrisisResource {
    pub name: &'static str,
    pub contact: &'static str,
    pub availability: &'static str,
}

#[derive(Debug, Clone)]
pub struct CrisisAssessment {
    pub level: CrisisLevel,
    pub detected_signals: Vec<String>,
    pub should_escalate: bool,
    pub resources: Vec<CrisisResource>,
    pub response: String,
}

/// Ordered: critical slices get the whole list, high the first three,
/// moderate the first two.
const RESOURCES: [CrisisResource; 4] = [
    CrisisResource {
        name: "988 Suicide & Crisis Lifeline",
        contact: "call or text 988",
        availability: "24/7",
    },
    CrisisResource {
        name: "Crisis Text Line",
        contact: "text HOME to 741741",
        availability: "24/7",
    },
    CrisisResource {
        name: "SAMHSA National Helpline",
        contact: "1-800-662-4357",
        availability: "24/7",
    },
    CrisisResource {
        name: "Emergency services",
        contact: "call 911",
        availability: "immediate",
    },
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
        .collect()
}

static CRITICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bkill(ing)? myself\b",
        r"\bsuicid\w*\b",
        r"\bend(ing)? (my|it) (life|all)\b",
        r"\bwant(ed)? to die\b",
        r"\bbetter off dead\b",
        r"\bno reason to (live|go on)\b",
        r"\btake my own life\b",
    ])
});

static HIGH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bhurt(ing)? myself\b",
        r"\bself[- ]harm\w*\b",
        r"\bcan'?t go on\b",
        r"\bgiv(e|ing) up on everything\b",
        r"\bwish I (wasn'?t|weren'?t) here\b",
        r"\bdisappear forever\b",
    ])
});

static MODERATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bhopeless\b",
        r"\bworthless\b",
        r"\bno way out\b",
        r"\bcan'?t take (this|it) anymore\b",
        r"\bnothing matters\b",
        r"\beverything is falling apart\b",
    ])
});

const CRITICAL_RESPONSES: [&str; 2] = [
    "I'm really glad you told me. What you're feeling matters, and you deserve support right now. Please reach out to one of these people who are trained to help — they're available around the clock.",
    "Thank you for trusting me with this. You don't have to carry it alone. Right now the most caring thing I can do is connect you with someone trained for this moment.",
];

const HIGH_RESPONSES: [&str; 2] = [
    "That sounds incredibly heavy, and I'm taking it seriously. You deserve real support — here are people who can be with you in this.",
    "I hear how much pain is in that. Please consider talking with someone trained to help; you don't have to manage this by yourself.",
];

const MODERATE_RESPONSES: [&str; 2] = [
    "It sounds like things feel really dark right now. Those feelings are worth taking seriously. Would it help to talk through what's weighing on you the most?",
    "I'm hearing a lot of pain in that. You don't have to hold it alone — and if it ever feels like too much, there are people ready to listen.",
];

fn matches_for(patterns: &[Regex], text: &str) -> Vec<String> {
    patterns
        .iter()
        .filter_map(|re| re.find(text).map(|m| m.as_str().to_lowercase()))
        .collect()
}

/// Pure tier walk: critical first and short-circuiting, then high, then
/// moderate. Identical text always yields an identical assessment.
pub fn assess(text: &str) -> CrisisAssessment {
    let critical = matches_for(&CRITICAL_PATTERNS, text);
    if !critical.is_empty() {
        return tier_assessment(CrisisLevel::Critical, critical);
    }

    let high = matches_for(&HIGH_PATTERNS, text);
    if !high.is_empty() {
        return tier_assessment(CrisisLevel::High, high);
    }

    let moderate = matches_for(&MODERATE_PATTERNS, text);
    if !moderate.is_empty() {
        return tier_assessment(CrisisLevel::Moderate, moderate);
    }

    CrisisAssessment {
        level: CrisisLevel::None,
        detected_signals: Vec::new(),
        should_escalate: false,
        resources: Vec::new(),
        response: String::new(),
    }
}

fn tier_assessment(level: CrisisLevel, signals: Vec<String>) -> CrisisAssessment {
    let (pool, resource_count): (&[&str], usize) = match level {
        CrisisLevel::Critical => (&CRITICAL_RESPONSES, RESOURCES.len()),
        CrisisLevel::High => (&HIGH_RESPONSES, 3),
        _ => (&MODERATE_RESPONSES, 2),
    };
    // Deterministic pick keeps assess() a pure function of its input.
    let response = pool[signals.len() % pool.len()].to_string();

    CrisisAssessment {
        should_escalate: matches!(level, CrisisLevel::High | CrisisLevel::Critical),
        resources: RESOURCES[..resource_count].to_vec(),
        detected_signals: signals,
        response,
        level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_none() {
        let a = assess("I had a pretty good day at work today");
        assert_eq!(a.level, CrisisLevel::None);
        assert!(!a.should_escalate);
        assert!(a.resources.is_empty());
    }

    #[test]
    fn critical_shortcircuits_lower_tiers() {
        let a = assess("everything feels hopeless and I want to die");
        assert_eq!(a.level, CrisisLevel::Critical);
        assert_eq!(a.resources.len(), RESOURCES.len());
    }

    #[test]
    fn moderate_slices_two_resources() {
        let a = assess("lately everything is falling apart");
        assert_eq!(a.level, CrisisLevel::Moderate);
        assert_eq!(a.resources.len(), 2);
        assert!(!a.should_escalate);
    }

    #[test]
    fn assessment_is_deterministic() {
        let a = assess("I can't go on");
        let b = assess("I can't go on");
        assert_eq!(a.level, b.level);
        assert_eq!(a.response, b.response);
        assert_eq!(a.detected_signals, b.detected_signals);
    }
}
