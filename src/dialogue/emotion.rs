/// Keyword-level emotion tagging. Deliberately shallow: the point is a
/// stable label for pool selection and phase pacing, not sentiment science.
const EMOTION_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "anxious",
        &["anxious", "anxiety", "worried", "panic", "nervous", "on edge"],
    ),
    (
        "sad",
        &["sad", "down", "crying", "heartbroken", "grief", "miss him", "miss her"],
    ),
    (
        "angry",
        &["angry", "furious", "rage", "fed up", "irritated", "resent"],
    ),
    (
        "overwhelmed",
        &["overwhelmed", "too much", "drowning", "burned out", "burnt out", "exhausted"],
    ),
    (
        "lonely",
        &["lonely", "alone", "isolated", "no one to talk"],
    ),
    ("hopeful", &["hopeful", "optimistic", "looking forward"]),
    ("grateful", &["grateful", "thankful", "appreciate"]),
    ("calm", &["calm", "peaceful", "settled", "relaxed"]),
];

/// Emotions that accelerate phase advancement.
const STRONG_EMOTIONS: &[&str] = &["anxious", "sad", "angry", "overwhelmed", "lonely"];

/// All emotions whose keywords appear, in lexicon order.
pub fn detect(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    EMOTION_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| (*name).to_string())
        .collect()
}

pub fn primary(text: &str) -> Option<String> {
    detect(text).into_iter().next()
}

pub fn is_strong(emotion: &str) -> bool {
    STRONG_EMOTIONS.contains(&emotion)
}
